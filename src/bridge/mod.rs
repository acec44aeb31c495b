//! # Call Bridge
//!
//! Per-call state and the glue between the telephony stream and the AI
//! session.
//!
//! ## Key Components:
//! - **CallBridge**: sans-IO state machine, one per call
//! - **BridgeServices**: shared collaborators (context, AI connector, persister)
//! - **CallerIdentity**: memory partition key for a call
//! - **Transcript**: append-only turn buffer

pub mod identity;     // Caller identity and partition keys
pub mod session;      // Call state machine
pub mod setup;        // Background AI session setup
pub mod transcript;   // Turn buffer
