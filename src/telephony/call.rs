//! # Call Driver
//!
//! Runs one call's [`CallBridge`] against live collaborators. The driver
//! owns the bridge and the AI session handle and executes every bridge
//! command; only the effects that need the transport or the actor's timers
//! go through a [`CallSink`].
//!
//! The media stream actor is the production sink. Tests drive a recording
//! sink and resolve setup futures by hand.

use crate::ai::session::AiSessionHandle;
use crate::ai::{AiError, AiEvent};
use crate::bridge::session::{BridgeCommand, BridgeState, CallBridge};
use crate::bridge::setup::{open_ai_session, BridgeServices};
use crate::bridge::transcript::Speaker;
use crate::telephony::protocol::{InboundEvent, OutboundMessage};
use futures_util::future::LocalBoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Pending AI session setup.
pub type SetupFuture = LocalBoxFuture<'static, Result<AiSessionHandle, AiError>>;

/// Effects the driver cannot perform on its own.
pub trait CallSink {
    /// Write one message to the telephony stream.
    fn send(&mut self, message: &OutboundMessage);

    /// Run `setup` and report its result through [`CallDriver::on_setup_result`].
    fn spawn_setup(&mut self, attempt: u32, setup: SetupFuture);

    /// Call [`CallDriver::on_sequence_deadline`] after `after`.
    fn schedule_sequence_check(&mut self, sequence_id: u64, after: Duration);

    /// Close the telephony stream.
    fn close(&mut self);
}

pub struct CallDriver {
    /// Local id for log correlation before the provider's ids are known
    connection_id: Uuid,
    bridge: CallBridge,
    ai: Option<AiSessionHandle>,
    services: Arc<BridgeServices>,
    ai_events: mpsc::UnboundedSender<AiEvent>,
    summary_logged: bool,
}

impl CallDriver {
    pub fn new(services: Arc<BridgeServices>, ai_events: mpsc::UnboundedSender<AiEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            bridge: CallBridge::new(services.settings.clone()),
            ai: None,
            services,
            ai_events,
            summary_logged: false,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn bridge(&self) -> &CallBridge {
        &self.bridge
    }

    /// One parsed telephony event.
    pub fn on_inbound(&mut self, event: InboundEvent, sink: &mut dyn CallSink) {
        let commands = match event {
            InboundEvent::Connected { protocol } => {
                debug!(connection = %self.connection_id, ?protocol, "Media stream connected");
                Vec::new()
            }
            InboundEvent::Start { start } => {
                self.bridge
                    .on_telephony_start(&start.stream_sid, &start.call_sid, start.caller())
            }
            InboundEvent::Media { media } => {
                if !media.is_caller_audio() {
                    debug!(track = ?media.track, "Ignoring non-caller media track");
                    return;
                }
                self.bridge.on_telephony_audio(media.payload)
            }
            InboundEvent::Mark { mark } => self.bridge.on_telephony_mark(&mark.name),
            InboundEvent::Dtmf { dtmf } => {
                info!(call_sid = ?self.bridge.call_sid(), digit = %dtmf.digit, "Caller pressed a key");
                Vec::new()
            }
            InboundEvent::Stop {} => {
                info!(call_sid = ?self.bridge.call_sid(), "Stream stop received");
                self.bridge.on_telephony_stop()
            }
            InboundEvent::Unknown => {
                debug!(connection = %self.connection_id, "Ignoring unknown stream event");
                Vec::new()
            }
        };
        self.execute(commands, sink);
    }

    pub fn on_ai_event(&mut self, event: AiEvent, sink: &mut dyn CallSink) {
        let commands = match event {
            AiEvent::Metadata { conversation_id } => {
                info!(call_sid = ?self.bridge.call_sid(), ?conversation_id, "AI conversation started");
                Vec::new()
            }
            AiEvent::AudioFrame(payload) => self.bridge.on_ai_audio(payload),
            AiEvent::Interruption => self.bridge.on_ai_interruption(),
            AiEvent::AgentTranscript(text) => self.bridge.on_transcript(Speaker::Agent, text),
            AiEvent::CallerTranscript(text) => self.bridge.on_transcript(Speaker::Caller, text),
            AiEvent::KeepAlivePing(event_id) => self.bridge.on_ai_ping(event_id),
            AiEvent::Closed => self.bridge.on_ai_closed(),
            AiEvent::Error(err) => self.bridge.on_ai_error(&err),
        };
        self.execute(commands, sink);
    }

    /// Result of a setup started through [`CallSink::spawn_setup`].
    pub fn on_setup_result(
        &mut self,
        attempt: u32,
        result: Result<AiSessionHandle, AiError>,
        sink: &mut dyn CallSink,
    ) {
        match result {
            Ok(mut handle) => {
                let commands = self.bridge.on_setup_completed(attempt);
                if self.bridge.is_ai_open() && self.ai.is_none() {
                    self.ai = Some(handle);
                    self.execute(commands, sink);
                } else {
                    // the call is over; this session must not outlive it
                    handle.close();
                }
            }
            Err(err) => {
                let commands = self.bridge.on_setup_failed(attempt, &err.to_string());
                self.execute(commands, sink);
            }
        }
    }

    pub fn on_sequence_deadline(&mut self, sequence_id: u64, sink: &mut dyn CallSink) {
        let commands = self.bridge.on_sequence_deadline(sequence_id);
        self.execute(commands, sink);
    }

    /// The telephony side is gone. Tears down whatever is still open.
    pub fn on_disconnected(&mut self, sink: &mut dyn CallSink) {
        let commands = self.bridge.on_telephony_disconnected();
        self.execute(commands, sink);
        if let Some(mut ai) = self.ai.take() {
            ai.close();
        }
        self.log_summary();
    }

    /// Execute bridge commands in order.
    fn execute(&mut self, commands: Vec<BridgeCommand>, sink: &mut dyn CallSink) {
        for command in commands {
            match command {
                BridgeCommand::BeginSetup { attempt, personalized } => {
                    self.begin_setup(attempt, personalized, sink);
                }
                BridgeCommand::ForwardToAi(payload) => {
                    let queued = self
                        .ai
                        .as_ref()
                        .map_or(false, |ai| ai.send_caller_audio(payload));
                    self.bridge.record_forward(queued);
                }
                BridgeCommand::Telephony(message) => sink.send(&message),
                BridgeCommand::PongAi(event_id) => {
                    if let Some(ai) = &self.ai {
                        ai.pong(event_id);
                    }
                }
                BridgeCommand::CloseAi => {
                    if let Some(mut ai) = self.ai.take() {
                        ai.close();
                    }
                }
                BridgeCommand::Persist { call_id, caller, turns } => {
                    // detached; teardown continues immediately
                    let _ = self.services.persister.dispatch(&call_id, &caller, turns);
                }
                BridgeCommand::ScheduleSequenceCheck { sequence_id, after } => {
                    sink.schedule_sequence_check(sequence_id, after);
                }
                BridgeCommand::CloseTelephony => sink.close(),
            }
        }

        if self.bridge.state() == BridgeState::Closing {
            self.bridge.mark_closed();
            self.log_summary();
        }
    }

    fn begin_setup(&mut self, attempt: u32, personalized: bool, sink: &mut dyn CallSink) {
        let caller = match self.bridge.caller() {
            Some(caller) => caller.clone(),
            None => return,
        };

        debug!(
            call_sid = ?self.bridge.call_sid(),
            attempt,
            personalized,
            "Starting AI setup"
        );

        let setup = open_ai_session(
            self.services.clone(),
            caller,
            personalized,
            self.ai_events.clone(),
        );
        sink.spawn_setup(attempt, Box::pin(setup));
    }

    /// One summary line per call.
    fn log_summary(&mut self) {
        if self.summary_logged || self.bridge.state() != BridgeState::Closed {
            return;
        }
        self.summary_logged = true;

        let stats = self.bridge.stats();
        info!(
            connection = %self.connection_id,
            call_sid = ?self.bridge.call_sid(),
            stream_sid = ?self.bridge.stream_sid(),
            caller = ?self.bridge.caller().map(|c| c.to_string()),
            reason = ?self.bridge.close_reason(),
            turns = self.bridge.transcript().len(),
            caller_frames_forwarded = stats.caller_frames_forwarded,
            caller_frames_dropped = stats.caller_frames_dropped,
            agent_frames_sent = stats.agent_frames_sent,
            sequences_sent = stats.sequences_sent,
            setup_attempts = stats.setup_attempts,
            "Call ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::session::testing::FakeConnector;
    use crate::ai::session::AiControl;
    use crate::bridge::setup::testing::services;
    use crate::memory::testing::FakeMemoryStore;
    use crate::memory::MemoryItem;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<OutboundMessage>,
        setups: Vec<(u32, SetupFuture)>,
        checks: Vec<(u64, Duration)>,
        closed: bool,
    }

    impl CallSink for RecordingSink {
        fn send(&mut self, message: &OutboundMessage) {
            self.sent.push(message.clone());
        }

        fn spawn_setup(&mut self, attempt: u32, setup: SetupFuture) {
            self.setups.push((attempt, setup));
        }

        fn schedule_sequence_check(&mut self, sequence_id: u64, after: Duration) {
            self.checks.push((sequence_id, after));
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    struct Harness {
        driver: CallDriver,
        sink: RecordingSink,
        store: Arc<FakeMemoryStore>,
        connector: Arc<FakeConnector>,
        _events_rx: mpsc::UnboundedReceiver<AiEvent>,
    }

    impl Harness {
        fn new(store: FakeMemoryStore, connector: FakeConnector) -> Self {
            let store = Arc::new(store);
            let connector = Arc::new(connector);
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            Self {
                driver: CallDriver::new(services(store.clone(), connector.clone()), events_tx),
                sink: RecordingSink::default(),
                store,
                connector,
                _events_rx: events_rx,
            }
        }

        fn inbound(&mut self, raw: &str) {
            let event: InboundEvent = serde_json::from_str(raw).unwrap();
            self.driver.on_inbound(event, &mut self.sink);
        }

        fn start(&mut self) {
            self.inbound(
                r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1","customParameters":{"from":"+15550001111"}}}"#,
            );
        }

        fn ai(&mut self, event: AiEvent) {
            self.driver.on_ai_event(event, &mut self.sink);
        }

        /// Await every pending setup and feed the results back.
        async fn finish_setups(&mut self) {
            loop {
                let pending = std::mem::take(&mut self.sink.setups);
                if pending.is_empty() {
                    break;
                }
                for (attempt, setup) in pending {
                    let result = setup.await;
                    self.driver.on_setup_result(attempt, result, &mut self.sink);
                }
            }
        }

        async fn appended(&self) -> usize {
            // persistence runs on a detached task
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
            self.store.appended.lock().unwrap().len()
        }
    }

    #[actix_web::test]
    async fn test_memory_outage_still_bridges_caller_audio() {
        let mut h = Harness::new(
            FakeMemoryStore { fail_search: true, ..Default::default() },
            FakeConnector::default(),
        );
        h.start();
        assert_eq!(h.sink.setups.len(), 1);
        h.finish_setups().await;

        assert!(h.driver.bridge().is_ai_open());
        assert!(!h.connector.contexts.lock().unwrap()[0].is_personalized());

        h.inbound(r#"{"event":"media","media":{"track":"inbound","payload":"AAAA"}}"#);
        let received = h.connector.audio_rx.lock().unwrap()[0].try_recv().unwrap();
        assert_eq!(received, "AAAA");
        assert_eq!(h.driver.bridge().stats().caller_frames_forwarded, 1);
    }

    #[actix_web::test]
    async fn test_full_ai_queue_counts_dropped_frames() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;

        // the fake session's queue holds one frame
        h.inbound(r#"{"event":"media","media":{"payload":"AAAA"}}"#);
        h.inbound(r#"{"event":"media","media":{"payload":"BBBB"}}"#);
        h.inbound(r#"{"event":"media","media":{"track":"outbound","payload":"CCCC"}}"#);

        let stats = h.driver.bridge().stats();
        assert_eq!(stats.caller_frames_forwarded, 1);
        assert_eq!(stats.caller_frames_dropped, 1);
    }

    #[actix_web::test]
    async fn test_personalized_session_gets_memories() {
        let mut h = Harness::new(
            FakeMemoryStore {
                items: vec![MemoryItem::new("Prefers 9am appointments")],
                ..Default::default()
            },
            FakeConnector::default(),
        );
        h.start();
        h.finish_setups().await;

        let contexts = h.connector.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].is_personalized());
    }

    #[actix_web::test]
    async fn test_stop_while_setup_pending_closes_late_session() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.inbound(r#"{"event":"media","media":{"payload":"AAAA"}}"#);
        h.inbound(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#);
        assert_eq!(h.driver.bridge().state(), BridgeState::Closed);

        h.finish_setups().await;

        assert!(!h.driver.bridge().is_ai_open());
        let mut control = h.connector.control_rx.lock().unwrap().remove(0);
        assert_eq!(control.try_recv().unwrap(), AiControl::Close);
        assert!(h.connector.audio_rx.lock().unwrap()[0].try_recv().is_err());
        assert_eq!(h.driver.bridge().stats().caller_frames_forwarded, 0);
        assert_eq!(h.appended().await, 0);
        assert!(!h.sink.closed);
    }

    #[actix_web::test]
    async fn test_setup_retry_then_give_up_closes_telephony() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::failing(2));
        h.start();
        h.finish_setups().await;

        assert_eq!(h.connector.contexts.lock().unwrap().len(), 2);
        assert_eq!(h.driver.bridge().state(), BridgeState::Closed);
        assert!(h.sink.closed);
    }

    #[actix_web::test]
    async fn test_interruption_clears_after_agent_audio() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;

        h.ai(AiEvent::AudioFrame("AGENT1".to_string()));
        h.ai(AiEvent::Interruption);

        assert_eq!(
            h.sink.sent,
            vec![
                OutboundMessage::media("MZ1", "AGENT1".to_string()),
                OutboundMessage::clear("MZ1"),
            ]
        );
    }

    #[actix_web::test]
    async fn test_ping_answered_through_session() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;

        h.ai(AiEvent::KeepAlivePing(42));
        let mut control = h.connector.control_rx.lock().unwrap().remove(0);
        assert_eq!(control.try_recv().unwrap(), AiControl::Pong(42));
    }

    #[actix_web::test]
    async fn test_voicemail_prompt_schedules_sequence_check() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;

        h.ai(AiEvent::CallerTranscript(
            "Please leave a message after the tone".to_string(),
        ));

        assert!(matches!(h.sink.sent.last(), Some(OutboundMessage::Mark { .. })));
        assert_eq!(h.sink.checks.len(), 1);

        let (sequence_id, _) = h.sink.checks[0];
        h.driver.on_sequence_deadline(sequence_id, &mut h.sink);
        assert!(!h.driver.bridge().sequence_in_progress());
    }

    #[actix_web::test]
    async fn test_disconnect_persists_and_closes_session() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;
        h.ai(AiEvent::AgentTranscript("Hello! How can I help you today?".to_string()));
        h.ai(AiEvent::CallerTranscript("Move my appointment".to_string()));

        h.driver.on_disconnected(&mut h.sink);

        assert_eq!(h.driver.bridge().state(), BridgeState::Closed);
        let mut control = h.connector.control_rx.lock().unwrap().remove(0);
        assert_eq!(control.try_recv().unwrap(), AiControl::Close);
        assert_eq!(h.appended().await, 1);

        // a second disconnect is a no-op
        h.driver.on_disconnected(&mut h.sink);
        assert_eq!(h.appended().await, 1);
    }

    #[actix_web::test]
    async fn test_ai_close_mid_call_closes_telephony() {
        let mut h = Harness::new(FakeMemoryStore::default(), FakeConnector::default());
        h.start();
        h.finish_setups().await;

        h.ai(AiEvent::Closed);
        assert!(h.sink.closed);
        assert_eq!(h.driver.bridge().state(), BridgeState::Closed);
    }
}
