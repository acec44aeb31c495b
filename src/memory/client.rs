//! HTTP client for the Mem0 memory platform.
//!
//! Auth: `Authorization: Token <key>` header.

use crate::config::MemoryConfig;
use crate::memory::{ConversationRecord, MemoryError, MemoryItem, MemoryQuery, MemoryStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Only memories written by voice calls are used for personalization.
const VOICE_CALL_TYPE: &str = "voice_call";

pub struct Mem0Client {
    http: Client,
    api_base: String,
    api_key: String,
}

/// Search responses come back either as a bare array or wrapped in `results`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Bare(Vec<MemoryItem>),
    Wrapped { results: Vec<MemoryItem> },
}

impl SearchResponse {
    fn into_items(self) -> Vec<MemoryItem> {
        match self {
            SearchResponse::Bare(items) => items,
            SearchResponse::Wrapped { results } => results,
        }
    }
}

impl Mem0Client {
    pub fn new(config: &MemoryConfig) -> Result<Self, MemoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(MemoryError::Status { status, body })
    }
}

#[async_trait]
impl MemoryStore for Mem0Client {
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryItem>, MemoryError> {
        let body = json!({
            "query": query.text,
            "filters": {
                "AND": [
                    { "user_id": query.user_id },
                    { "metadata.type": VOICE_CALL_TYPE }
                ]
            },
            "top_k": query.limit,
        });

        debug!(user_id = %query.user_id, limit = query.limit, "Searching memories");

        let resp = self
            .http
            .post(format!("{}/v2/memories/search/", self.api_base))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let parsed: SearchResponse = Self::check(resp).await?.json().await?;
        Ok(parsed.into_items())
    }

    async fn append(&self, record: &ConversationRecord) -> Result<(), MemoryError> {
        debug!(
            user_id = %record.user_id,
            messages = record.messages.len(),
            "Appending conversation memory"
        );

        let resp = self
            .http
            .post(format!("{}/v1/memories/", self.api_base))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(record)
            .send()
            .await?;

        Self::check(resp).await?;
        Ok(())
    }
}
