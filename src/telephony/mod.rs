//! # Telephony Side
//!
//! The call-setup webhook and the bidirectional media stream.
//!
//! ## Key Components:
//! - **Protocol**: inbound stream events and outbound media/clear/mark messages
//! - **TwiML**: the webhook answer that points the call at our stream endpoint
//! - **Call**: executes one call's bridge commands against live collaborators
//! - **Stream**: the per-call actor feeding the call driver

pub mod call;       // Bridge command execution
pub mod protocol;   // Media stream wire format
pub mod stream;     // Per-call WebSocket actor
pub mod twiml;      // Call-setup webhook
