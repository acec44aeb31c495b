//! ElevenLabs Conversational AI wire messages.
//!
//! Inbound messages are tagged by `type`; unknown types deserialize to
//! [`ServerMessage::Other`] and are ignored.

use crate::ai::AiEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConversationInitiationMetadata {
        #[serde(default)]
        conversation_initiation_metadata_event: Option<InitiationMetadata>,
    },
    Audio {
        #[serde(default)]
        audio_event: Option<AudioEvent>,
        /// Older agents send `audio.chunk` instead of `audio_event`
        #[serde(default)]
        audio: Option<LegacyAudio>,
    },
    Interruption {},
    Ping {
        ping_event: PingEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct InitiationMetadata {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
}

#[derive(Debug, Deserialize)]
pub struct LegacyAudio {
    pub chunk: String,
}

#[derive(Debug, Deserialize)]
pub struct PingEvent {
    pub event_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Debug, Deserialize)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
}

impl ServerMessage {
    /// Translate into a bridge event. Messages with nothing to act on yield `None`.
    pub fn into_event(self) -> Option<AiEvent> {
        match self {
            ServerMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => Some(AiEvent::Metadata {
                conversation_id: conversation_initiation_metadata_event
                    .and_then(|meta| meta.conversation_id),
            }),
            ServerMessage::Audio { audio_event, audio } => audio_event
                .map(|event| event.audio_base_64)
                .or_else(|| audio.map(|legacy| legacy.chunk))
                .filter(|payload| !payload.is_empty())
                .map(AiEvent::AudioFrame),
            ServerMessage::Interruption {} => Some(AiEvent::Interruption),
            ServerMessage::Ping { ping_event } => Some(AiEvent::KeepAlivePing(ping_event.event_id)),
            ServerMessage::AgentResponse { agent_response_event } => {
                Some(AiEvent::AgentTranscript(agent_response_event.agent_response))
            }
            ServerMessage::UserTranscript { user_transcription_event } => Some(
                AiEvent::CallerTranscript(user_transcription_event.user_transcript),
            ),
            ServerMessage::Other => None,
        }
    }
}

/// Caller audio sent to the agent.
#[derive(Debug, Serialize)]
pub struct UserAudioChunk<'a> {
    pub user_audio_chunk: &'a str,
}

/// Control messages sent to the agent.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    Pong { event_id: u64 },
}

/// Body of the signed-URL request when the session is personalized.
#[derive(Debug, Serialize)]
pub struct ConversationOverride {
    pub conversation_config_override: ConfigOverride,
}

#[derive(Debug, Serialize)]
pub struct ConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Serialize)]
pub struct AgentOverride {
    pub prompt: PromptOverride,
    pub first_message: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct PromptOverride {
    pub prompt: String,
}

impl ConversationOverride {
    pub fn new(prompt: String, first_message: String, language: String) -> Self {
        Self {
            conversation_config_override: ConfigOverride {
                agent: AgentOverride {
                    prompt: PromptOverride { prompt },
                    first_message,
                    language,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlResponse {
    pub signed_url: String,
}
