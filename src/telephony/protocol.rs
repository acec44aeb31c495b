//! Twilio Media Streams messages.
//!
//! Inbound events are tagged by `event`. Audio payloads are base64 μ-law at
//! 8kHz in both directions and are passed through without decoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    Stop {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub from: Option<String>,
}

impl StartPayload {
    /// Caller number, from the `from` stream parameter or the start payload.
    pub fn caller(&self) -> Option<&str> {
        self.custom_parameters
            .get("from")
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.from.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

impl MediaPayload {
    /// Caller-side audio. Streams opened with both tracks also echo the
    /// outbound leg, which must never be fed back to the agent.
    pub fn is_caller_audio(&self) -> bool {
        match self.track.as_deref() {
            None => true,
            Some(track) => track.starts_with("inbound"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

/// Messages written back to the telephony stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Discard any audio the provider has buffered for playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    /// Echoed back by the provider once all earlier audio has played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl OutboundMessage {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        OutboundMessage::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        OutboundMessage::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn mark(stream_sid: &str, name: String) -> Self {
        OutboundMessage::Mark {
            stream_sid: stream_sid.to_string(),
            mark: OutboundMark { name },
        }
    }
}
