//! # Context Provider
//!
//! Builds the personalization context for a call before the AI session opens:
//! an opening greeting and a prompt suffix derived from the caller's earlier
//! conversations.
//!
//! ## Fallback Guarantee:
//! `fetch_context` never fails. A slow, failing, or empty memory service
//! yields the generic context, and the call connects without personalization.

use crate::bridge::identity::CallerIdentity;
use crate::memory::{MemoryItem, MemoryQuery, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const GENERIC_GREETING: &str = "Hello! How can I help you today?";

const SCHEDULING_GREETING: &str =
    "Welcome back! I'm here to help with your scheduling needs. How can I assist you today?";
const SUPPORT_GREETING: &str =
    "Hi there! I see we've been working on some support items. How can I help you today?";
const RETURNING_GREETING: &str =
    "Welcome back! I remember our previous conversations. How can I assist you today?";

/// Per-call personalization, computed once and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalizationContext {
    /// Appended to the agent's base prompt
    pub prompt_suffix: String,
    /// The agent's first spoken message
    pub opening_greeting: String,
    pub recalled_memory_count: usize,
}

impl PersonalizationContext {
    /// Context used when nothing is known about the caller.
    pub fn generic() -> Self {
        Self {
            prompt_suffix: String::new(),
            opening_greeting: GENERIC_GREETING.to_string(),
            recalled_memory_count: 0,
        }
    }

    /// Build a context from ranked memories (most relevant first).
    pub fn from_memories(memories: &[MemoryItem]) -> Self {
        if memories.is_empty() {
            return Self::generic();
        }
        Self {
            prompt_suffix: format_prompt_suffix(memories),
            opening_greeting: greeting_for(memories),
            recalled_memory_count: memories.len(),
        }
    }

    /// Whether the AI session should be opened with overrides.
    pub fn is_personalized(&self) -> bool {
        self.recalled_memory_count > 0
    }
}

/// Prompt block listing recalled memories.
fn format_prompt_suffix(memories: &[MemoryItem]) -> String {
    let lines: Vec<String> = memories
        .iter()
        .map(|item| {
            let when = item
                .recorded_on()
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "Recent".to_string());
            format!("- {} ({})", item.memory, when)
        })
        .collect();

    format!(
        "\n\nPREVIOUS CONVERSATION CONTEXT:\n{}\n\nUse this context to provide personalized, continuous service. Reference previous interactions naturally when relevant.",
        lines.join("\n")
    )
}

/// Greeting chosen from the two most relevant memories.
fn greeting_for(memories: &[MemoryItem]) -> String {
    let recent = memories
        .iter()
        .take(2)
        .map(|item| item.memory.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ");

    let greeting = if recent.contains("appointment") || recent.contains("schedule") {
        SCHEDULING_GREETING
    } else if recent.contains("support") || recent.contains("issue") {
        SUPPORT_GREETING
    } else {
        RETURNING_GREETING
    };
    greeting.to_string()
}

/// Fetches personalization for a caller from the memory store.
pub struct ContextProvider {
    store: Arc<dyn MemoryStore>,
    timeout: Duration,
    search_limit: usize,
    search_query: String,
}

impl ContextProvider {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        timeout: Duration,
        search_limit: usize,
        search_query: String,
    ) -> Self {
        Self {
            store,
            timeout,
            search_limit,
            search_query,
        }
    }

    /// Personalization for `caller`, bounded by the configured timeout.
    pub async fn fetch_context(&self, caller: &CallerIdentity) -> PersonalizationContext {
        if !caller.is_stable() {
            // a fresh call id has no history to recall
            return PersonalizationContext::generic();
        }

        let query = MemoryQuery {
            user_id: caller.partition_key(),
            text: self.search_query.clone(),
            limit: self.search_limit,
        };

        match tokio::time::timeout(self.timeout, self.store.search(&query)).await {
            Ok(Ok(memories)) => {
                let context = PersonalizationContext::from_memories(&memories);
                info!(
                    caller = %caller,
                    memories = context.recalled_memory_count,
                    "Personalization context prepared"
                );
                context
            }
            Ok(Err(err)) => {
                warn!(caller = %caller, error = %err, "Memory search failed, using generic context");
                PersonalizationContext::generic()
            }
            Err(_) => {
                warn!(
                    caller = %caller,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Memory search timed out, using generic context"
                );
                PersonalizationContext::generic()
            }
        }
    }
}
