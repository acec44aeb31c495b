//! # Conversational-AI Collaborator
//!
//! Opens and owns the companion stream to the AI agent. The rest of the
//! crate never sees the wire vocabulary: inbound frames are translated into
//! [`AiEvent`]s and outbound traffic goes through an [`session::AiSessionHandle`].
//!
//! ## Key Components:
//! - **protocol**: serde types for the agent's JSON messages
//! - **session**: connector trait, the ElevenLabs implementation, and the handle

pub mod protocol;   // Wire messages
pub mod session;    // Connector and session handle

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("signed URL request failed: {0}")]
    SignedUrl(String),

    #[error("AI service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI stream connect failed: {0}")]
    Connect(String),

    #[error("AI stream connect timed out after {0}ms")]
    Timeout(u64),

    #[error("unexpected AI service response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AiError::Decode(err.to_string())
        } else {
            AiError::SignedUrl(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AiError::Connect(err.to_string())
    }
}

/// Events raised by an open AI session, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum AiEvent {
    /// Session accepted by the agent
    Metadata { conversation_id: Option<String> },
    /// Base64 μ-law agent audio
    AudioFrame(String),
    /// The caller started speaking over the agent
    Interruption,
    AgentTranscript(String),
    CallerTranscript(String),
    /// Keep-alive that must be answered with a pong carrying the same id
    KeepAlivePing(u64),
    /// Remote side closed the stream
    Closed,
    Error(String),
}
