//! # Memory Collaborator
//!
//! Everything the bridge needs from the external memory service: searching a
//! caller's earlier conversations before a call, and appending the finished
//! conversation afterwards.
//!
//! ## Key Components:
//! - **MemoryStore**: the two-operation seam (search, append)
//! - **Mem0Client**: HTTP implementation of that seam
//! - **ContextProvider**: turns search results into a personalization context
//! - **TranscriptPersister**: fire-and-forget hand-off at call end

pub mod client;        // HTTP client for the memory service
pub mod context;       // Personalization context provider
pub mod persistence;   // Post-call transcript hand-off

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a memory store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory service request failed: {0}")]
    Network(String),

    #[error("memory service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected memory service response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MemoryError::Decode(err.to_string())
        } else {
            MemoryError::Network(err.to_string())
        }
    }
}

/// A contextual search for one caller's memories.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// Partition key of the caller
    pub user_id: String,
    /// Free-text query; empty means "most relevant overall"
    pub text: String,
    pub limit: usize,
}

/// One ranked memory returned by a search.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "content")]
    pub memory: String,
    /// Kept as text so one odd timestamp can't fail a whole search response
    #[serde(default)]
    pub created_at: Option<String>,
}

impl MemoryItem {
    pub fn new(memory: impl Into<String>) -> Self {
        Self {
            id: None,
            memory: memory.into(),
            created_at: None,
        }
    }

    /// Calendar date the memory was recorded, if the timestamp is readable.
    pub fn recorded_on(&self) -> Option<NaiveDate> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.date_naive());
        }
        raw.get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
    }
}

/// One chat message inside a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

/// A conversation to append under a caller's partition.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub user_id: String,
    pub messages: Vec<ConversationMessage>,
    pub metadata: serde_json::Value,
}

/// The memory service, as seen by the bridge.
///
/// Implementations are shared across all calls and must not hold per-call state.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Ranked memories for a caller, most relevant first.
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Append a conversation to a caller's memories.
    async fn append(&self, record: &ConversationRecord) -> Result<(), MemoryError>;

    /// Whether this store talks to a real service.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Store used when no memory service is configured: remembers nothing.
#[derive(Debug, Default)]
pub struct DisabledMemoryStore;

#[async_trait]
impl MemoryStore for DisabledMemoryStore {
    async fn search(&self, _query: &MemoryQuery) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    async fn append(&self, _record: &ConversationRecord) -> Result<(), MemoryError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store used by tests across the crate.

    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    pub struct FakeMemoryStore {
        pub items: Vec<MemoryItem>,
        pub fail_search: bool,
        pub fail_append: bool,
        pub search_delay: Option<Duration>,
        pub queries: Mutex<Vec<MemoryQuery>>,
        pub appended: Mutex<Vec<ConversationRecord>>,
    }

    #[async_trait]
    impl MemoryStore for FakeMemoryStore {
        async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryItem>, MemoryError> {
            self.queries.lock().unwrap().push(query.clone());
            if let Some(delay) = self.search_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_search {
                return Err(MemoryError::Network("connection refused".to_string()));
            }
            Ok(self.items.iter().take(query.limit).cloned().collect())
        }

        async fn append(&self, record: &ConversationRecord) -> Result<(), MemoryError> {
            if self.fail_append {
                return Err(MemoryError::Status { status: 500, body: "boom".to_string() });
            }
            self.appended.lock().unwrap().push(record.clone());
            Ok(())
        }
    }
}
