//! # AI Session
//!
//! ## Connection Lifecycle:
//! 1. Request a one-time signed URL (personalized sessions send overrides)
//! 2. Open the WebSocket within the connect timeout
//! 3. Split it: a reader task translates frames into [`AiEvent`]s, a writer
//!    task drains the outbound queues
//! 4. `close()` (or dropping the handle) shuts the stream down exactly once
//!
//! ## Back-pressure:
//! Caller audio goes through a bounded queue and is dropped when the queue is
//! full, so live audio never backs up behind a slow agent. Pongs and close
//! use an unbounded control queue that the writer always serves first.

use crate::ai::protocol::{
    ClientControl, ConversationOverride, ServerMessage, SignedUrlResponse, UserAudioChunk,
};
use crate::ai::{AiError, AiEvent};
use crate::config::AiConfig;
use crate::memory::context::PersonalizationContext;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Opens AI sessions. One connector is shared by every call.
#[async_trait]
pub trait AiConnector: Send + Sync {
    /// Open a session configured from `context`; events are delivered on `events`.
    async fn open(
        &self,
        context: &PersonalizationContext,
        events: mpsc::UnboundedSender<AiEvent>,
    ) -> Result<AiSessionHandle, AiError>;
}

/// Control traffic toward the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AiControl {
    Pong(u64),
    Close,
}

/// Outbound side of one open AI session.
pub struct AiSessionHandle {
    audio_tx: mpsc::Sender<String>,
    control_tx: mpsc::UnboundedSender<AiControl>,
    reader: Option<AbortHandle>,
    closed: bool,
}

impl AiSessionHandle {
    pub(crate) fn from_channels(
        audio_tx: mpsc::Sender<String>,
        control_tx: mpsc::UnboundedSender<AiControl>,
    ) -> Self {
        Self {
            audio_tx,
            control_tx,
            reader: None,
            closed: false,
        }
    }

    /// Queue one caller frame. Returns `false` if the frame was dropped.
    pub fn send_caller_audio(&self, payload: String) -> bool {
        if self.closed {
            return false;
        }
        match self.audio_tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Answer a keep-alive ping.
    pub fn pong(&self, event_id: u64) {
        if !self.closed {
            let _ = self.control_tx.send(AiControl::Pong(event_id));
        }
    }

    /// Close the stream. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.control_tx.send(AiControl::Close);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for AiSessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connector for ElevenLabs Conversational AI agents.
pub struct ElevenLabsConnector {
    http: Client,
    config: AiConfig,
}

impl ElevenLabsConnector {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Fetch a one-time session URL.
    ///
    /// Personalized sessions POST the prompt and greeting overrides; generic
    /// sessions use a plain GET and the agent's own defaults.
    async fn signed_url(&self, context: &PersonalizationContext) -> Result<String, AiError> {
        let url = format!(
            "{}/convai/conversation/get_signed_url",
            self.config.api_base.trim_end_matches('/')
        );
        let agent_id = [("agent_id", self.config.agent_id.as_str())];

        let request = if context.is_personalized() {
            let body = ConversationOverride::new(
                format!("{}{}", self.config.base_prompt, context.prompt_suffix),
                context.opening_greeting.clone(),
                self.config.language.clone(),
            );
            self.http.post(&url).query(&agent_id).json(&body)
        } else {
            self.http.get(&url).query(&agent_id)
        };

        let resp = request
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let parsed: SignedUrlResponse = resp.json().await?;
        Ok(parsed.signed_url)
    }
}

#[async_trait]
impl AiConnector for ElevenLabsConnector {
    async fn open(
        &self,
        context: &PersonalizationContext,
        events: mpsc::UnboundedSender<AiEvent>,
    ) -> Result<AiSessionHandle, AiError> {
        let signed_url = self.signed_url(context).await?;

        let timeout_ms = self.config.connect_timeout_ms;
        let (ws_stream, _) =
            tokio::time::timeout(Duration::from_millis(timeout_ms), connect_async(signed_url))
                .await
                .map_err(|_| AiError::Timeout(timeout_ms))??;

        info!(personalized = context.is_personalized(), "AI stream connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (audio_tx, mut audio_rx) = mpsc::channel::<String>(self.config.send_queue_frames.max(1));
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<AiControl>();

        tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    biased;
                    control = control_rx.recv() => match control {
                        Some(AiControl::Pong(event_id)) => {
                            serde_json::to_string(&ClientControl::Pong { event_id })
                        }
                        Some(AiControl::Close) | None => break,
                    },
                    Some(chunk) = audio_rx.recv() => {
                        serde_json::to_string(&UserAudioChunk { user_audio_chunk: &chunk })
                    }
                };

                let text = match outgoing {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Failed to encode AI message");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::text(text)).await {
                    debug!(error = %err, "AI stream write failed");
                    break;
                }
            }

            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            debug!("AI stream writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if let Some(event) = message.into_event() {
                                if events.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => debug!(error = %err, "Ignoring malformed AI message"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        let _ = events.send(AiEvent::Error(err.to_string()));
                        return;
                    }
                }
            }
            let _ = events.send(AiEvent::Closed);
        });

        let mut handle = AiSessionHandle::from_channels(audio_tx, control_tx);
        handle.reader = Some(reader.abort_handle());
        Ok(handle)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Connector fake driven entirely by in-memory channels.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeConnector {
        /// Number of opens that fail before one succeeds
        pub failures: AtomicUsize,
        pub contexts: Mutex<Vec<PersonalizationContext>>,
        pub audio_rx: Mutex<Vec<mpsc::Receiver<String>>>,
        pub control_rx: Mutex<Vec<mpsc::UnboundedReceiver<AiControl>>>,
        pub event_tx: Mutex<Vec<mpsc::UnboundedSender<AiEvent>>>,
    }

    impl FakeConnector {
        pub fn failing(times: usize) -> Self {
            Self {
                failures: AtomicUsize::new(times),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AiConnector for FakeConnector {
        async fn open(
            &self,
            context: &PersonalizationContext,
            events: mpsc::UnboundedSender<AiEvent>,
        ) -> Result<AiSessionHandle, AiError> {
            self.contexts.lock().unwrap().push(context.clone());
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(AiError::Connect("refused".to_string()));
            }

            let (audio_tx, audio_rx) = mpsc::channel(1);
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            self.audio_rx.lock().unwrap().push(audio_rx);
            self.control_rx.lock().unwrap().push(control_rx);
            self.event_tx.lock().unwrap().push(events);
            Ok(AiSessionHandle::from_channels(audio_tx, control_tx))
        }
    }
}
