//! # Audio Module
//!
//! Telephony-side audio handling. Caller and agent audio is relayed as opaque
//! base64 payloads; this module only deals with audio the bridge produces itself.
//!
//! ## Key Components:
//! - **Codec**: G.711 μ-law encoding and 20ms transport framing

pub mod codec;      // μ-law encoding and frame slicing
