//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between section and key)
//! - Well-known deployment variables (HOST, PORT, provider credentials)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`HOST`, `PORT`, `ELEVENLABS_AGENT_ID`, `ELEVENLABS_API_KEY`, `MEM0_API_KEY`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_AI__LANGUAGE`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impls)
//!
//! ## Sections:
//! - **server**: bind address
//! - **telephony**: media stream route and idle timeout
//! - **ai**: conversational agent credentials and session tuning
//! - **memory**: memory service credentials and search tuning
//! - **bridge**: setup retry and tone synthesis
//! - **performance**: call capacity

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub ai: AiConfig,
    pub memory: MemoryConfig,
    pub bridge: BridgeConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Telephony-side settings.
///
/// ## Fields:
/// - `stream_path`: route the provider opens the media WebSocket on
/// - `public_host`: host written into the stream URL; empty means "use the request's Host header"
/// - `idle_timeout_secs`: close a media stream that sends nothing for this long
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub stream_path: String,
    pub public_host: String,
    pub idle_timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            stream_path: "/media-stream".to_string(),
            public_host: String::new(),
            idle_timeout_secs: 60,
        }
    }
}

/// Conversational-AI agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_base: String,
    pub agent_id: String,
    pub api_key: String,
    /// Behavioral prompt that personalization is appended to
    pub base_prompt: String,
    pub language: String,
    pub connect_timeout_ms: u64,
    /// Caller frames allowed in flight toward the agent; more are dropped
    pub send_queue_frames: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io/v1".to_string(),
            agent_id: String::new(),
            api_key: String::new(),
            base_prompt: "You are a helpful voice assistant. Be conversational, friendly, and concise in your responses.".to_string(),
            language: "en".to_string(),
            connect_timeout_ms: 5000,
            send_queue_frames: 1,
        }
    }
}

/// Memory service settings. An empty `api_key` disables the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub api_base: String,
    pub api_key: String,
    pub search_limit: usize,
    pub fetch_timeout_ms: u64,
    pub search_query: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.mem0.ai".to_string(),
            api_key: String::new(),
            search_limit: 5,
            fetch_timeout_ms: 3000,
            search_query: "previous conversations".to_string(),
        }
    }
}

impl MemoryConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Call bridge tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bare (non-personalized) retries after a failed AI setup
    pub setup_retries: u32,
    pub tone_duration_ms: u32,
    pub inter_tone_gap_ms: u32,
    /// Peak level of each sine component, fraction of full scale
    pub tone_amplitude: f32,
    pub sequence_grace_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            setup_retries: 1,
            tone_duration_ms: 100,
            inter_tone_gap_ms: 200,
            tone_amplitude: 0.35,
            sequence_grace_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_calls: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MEMORY__SEARCH_LIMIT=3`: Override memory search size
    /// - `ELEVENLABS_AGENT_ID=agent_123`: Agent credentials from the deployment
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let overrides = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("ELEVENLABS_AGENT_ID", "ai.agent_id"),
            ("ELEVENLABS_API_KEY", "ai.api_key"),
            ("MEM0_API_KEY", "memory.api_key"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !self.telephony.stream_path.starts_with('/') {
            return Err(anyhow::anyhow!("Stream path must start with '/'"));
        }

        if self.telephony.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Idle timeout must be greater than 0"));
        }

        if self.performance.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        if self.ai.connect_timeout_ms == 0 || self.memory.fetch_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        if self.ai.send_queue_frames == 0 {
            return Err(anyhow::anyhow!("AI send queue must hold at least one frame"));
        }

        if self.memory.search_limit == 0 {
            return Err(anyhow::anyhow!("Memory search limit must be greater than 0"));
        }

        if self.bridge.tone_duration_ms == 0 {
            return Err(anyhow::anyhow!("Tone duration must be greater than 0"));
        }

        if !(self.bridge.tone_amplitude > 0.0 && self.bridge.tone_amplitude <= 0.5) {
            return Err(anyhow::anyhow!("Tone amplitude must be in (0, 0.5]"));
        }

        Ok(())
    }

    /// Refuse to start without agent credentials.
    pub fn ensure_credentials(&self) -> Result<()> {
        if self.ai.agent_id.trim().is_empty() {
            return Err(anyhow::anyhow!("Missing AI agent id (set ELEVENLABS_AGENT_ID)"));
        }
        if self.ai.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("Missing AI API key (set ELEVENLABS_API_KEY)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.telephony.stream_path, "/media-stream");
        assert_eq!(config.memory.search_limit, 5);
        assert_eq!(config.bridge.setup_retries, 1);
        assert!(!config.memory.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bridge.tone_amplitude = 0.8;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ai.send_queue_frames = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telephony.stream_path = "media".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_required() {
        let mut config = AppConfig::default();
        assert!(config.ensure_credentials().is_err());

        config.ai.agent_id = "agent_1".to_string();
        assert!(config.ensure_credentials().is_err());

        config.ai.api_key = "key".to_string();
        assert!(config.ensure_credentials().is_ok());
    }
}
