//! Post-call transcript hand-off.
//!
//! The persister turns a finished transcript into a conversation record with
//! a short summary and appends it on a detached task. Teardown never waits
//! for the result; failures are logged and dropped.

use crate::bridge::identity::CallerIdentity;
use crate::bridge::transcript::TranscriptTurn;
use crate::memory::{ConversationMessage, ConversationRecord, MemoryStore};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Topic groups used in the call summary.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("scheduling", &["appointment", "schedule", "meeting", "calendar"]),
    ("support", &["help", "issue", "problem", "support"]),
    ("product", &["product", "feature", "pricing", "plan"]),
    ("general", &["information", "question", "inquiry"]),
];

pub struct TranscriptPersister {
    store: Arc<dyn MemoryStore>,
}

impl TranscriptPersister {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Hand the transcript off for storage.
    ///
    /// Returns `None` when there is nothing to store. The handle is only
    /// useful to tests; callers are expected to drop it.
    pub fn dispatch(
        &self,
        call_id: &str,
        caller: &CallerIdentity,
        turns: Vec<TranscriptTurn>,
    ) -> Option<JoinHandle<()>> {
        if turns.is_empty() {
            return None;
        }

        let record = build_record(call_id, caller, &turns);
        let store = Arc::clone(&self.store);
        let call_id = call_id.to_string();

        Some(tokio::spawn(async move {
            match store.append(&record).await {
                Ok(()) => info!(
                    call_sid = %call_id,
                    user_id = %record.user_id,
                    messages = record.messages.len(),
                    "Conversation stored"
                ),
                Err(err) => warn!(call_sid = %call_id, error = %err, "Failed to store conversation"),
            }
        }))
    }
}

/// Conversation record for a finished call: every turn, then a summary.
pub fn build_record(
    call_id: &str,
    caller: &CallerIdentity,
    turns: &[TranscriptTurn],
) -> ConversationRecord {
    let mut messages: Vec<ConversationMessage> = turns
        .iter()
        .map(|turn| ConversationMessage {
            role: turn.speaker.role().to_string(),
            content: turn.text.clone(),
        })
        .collect();

    messages.push(ConversationMessage {
        role: "system".to_string(),
        content: summarize(turns),
    });

    ConversationRecord {
        user_id: caller.partition_key(),
        messages,
        metadata: json!({
            "call_id": call_id,
            "phone_number": caller.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
            "type": "voice_call",
            "source": "telephony_bridge",
        }),
    }
}

fn summarize(turns: &[TranscriptTurn]) -> String {
    format!(
        "Call Summary - Duration: {} turns, Topics discussed: {}",
        turns.len(),
        topics(turns).join(", ")
    )
}

/// Topic groups mentioned anywhere in the call, in table order.
fn topics(turns: &[TranscriptTurn]) -> Vec<&'static str> {
    let text = turns
        .iter()
        .map(|turn| turn.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let found: Vec<&'static str> = TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(topic, _)| *topic)
        .collect();

    if found.is_empty() {
        vec!["general conversation"]
    } else {
        found
    }
}
