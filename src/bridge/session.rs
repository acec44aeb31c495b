//! # Call Bridge
//!
//! The authoritative state machine for one call. It performs no I/O: every
//! input (telephony event, AI event, setup result, timer) is a method call
//! that returns the [`BridgeCommand`]s the owning actor must execute, in order.
//!
//! ## Call Lifecycle:
//! 1. **AwaitingStart**: stream connected, no start signal yet
//! 2. **Active**: ids and caller known; AI setup runs in the background
//! 3. **Closing**: stop, disconnect, or unrecoverable AI failure; teardown commands issued
//! 4. **Closed**: persistence dispatched, nothing more is accepted
//!
//! ## Invariants:
//! - At most one AI session per call; a late setup result after teardown is closed immediately
//! - The transcript only grows
//! - At most one signal sequence is in flight; candidates during a sequence are suppressed

use crate::bridge::identity::CallerIdentity;
use crate::bridge::transcript::{Speaker, Transcript, TranscriptTurn};
use crate::config::BridgeConfig;
use crate::signaling::analyzer;
use crate::signaling::tones::{ToneSettings, ToneSynthesizer};
use crate::signaling::SignalIntent;
use crate::telephony::protocol::OutboundMessage;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    AwaitingStart,
    Active,
    Closing,
    Closed,
}

impl BridgeState {
    pub fn as_str(&self) -> &str {
        match self {
            BridgeState::AwaitingStart => "awaiting_start",
            BridgeState::Active => "active",
            BridgeState::Closing => "closing",
            BridgeState::Closed => "closed",
        }
    }
}

/// Side effects requested by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    /// Open the AI session in the background (fetching context first when personalized)
    BeginSetup { attempt: u32, personalized: bool },
    ForwardToAi(String),
    Telephony(OutboundMessage),
    PongAi(u64),
    CloseAi,
    Persist {
        call_id: String,
        caller: CallerIdentity,
        turns: Vec<TranscriptTurn>,
    },
    /// Report back through `on_sequence_deadline` after the delay
    ScheduleSequenceCheck { sequence_id: u64, after: Duration },
    CloseTelephony,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Bare retries after the first setup attempt fails
    pub setup_retries: u32,
    /// Extra wait past a sequence's playback time before it counts as done
    pub sequence_grace: Duration,
    pub tones: ToneSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            setup_retries: 1,
            sequence_grace: Duration::from_millis(500),
            tones: ToneSettings::default(),
        }
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            setup_retries: config.setup_retries,
            sequence_grace: Duration::from_millis(config.sequence_grace_ms),
            tones: ToneSettings {
                tone_ms: config.tone_duration_ms,
                gap_ms: config.inter_tone_gap_ms,
                amplitude: config.tone_amplitude,
            },
        }
    }
}

/// Per-call counters, reported once at teardown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallStats {
    pub caller_frames_forwarded: u64,
    pub caller_frames_dropped: u64,
    pub agent_frames_sent: u64,
    pub agent_frames_discarded: u64,
    pub sequences_sent: u32,
    pub setup_attempts: u32,
}

#[derive(Debug, Clone)]
struct InFlightSequence {
    id: u64,
    intent: SignalIntent,
    mark_name: String,
}

pub struct CallBridge {
    state: BridgeState,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    caller: Option<CallerIdentity>,
    transcript: Transcript,
    /// Setup attempt whose result is awaited; stale results are ignored
    setup_attempt: u32,
    ai_open: bool,
    sequence: Option<InFlightSequence>,
    next_sequence_id: u64,
    close_reason: Option<String>,
    synthesizer: ToneSynthesizer,
    settings: BridgeSettings,
    stats: CallStats,
}

impl CallBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            state: BridgeState::AwaitingStart,
            stream_sid: None,
            call_sid: None,
            caller: None,
            transcript: Transcript::new(),
            setup_attempt: 0,
            ai_open: false,
            sequence: None,
            next_sequence_id: 0,
            close_reason: None,
            synthesizer: ToneSynthesizer::new(settings.tones.clone()),
            settings,
            stats: CallStats::default(),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    pub fn caller(&self) -> Option<&CallerIdentity> {
        self.caller.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }

    pub fn is_ai_open(&self) -> bool {
        self.ai_open
    }

    pub fn sequence_in_progress(&self) -> bool {
        self.sequence.is_some()
    }

    // ----- telephony side -----

    /// Stream start: record ids, resolve the caller, and kick off setup.
    pub fn on_telephony_start(
        &mut self,
        stream_sid: &str,
        call_sid: &str,
        caller: Option<&str>,
    ) -> Vec<BridgeCommand> {
        if self.state != BridgeState::AwaitingStart {
            warn!(stream_sid, state = self.state.as_str(), "Duplicate start signal ignored");
            return Vec::new();
        }

        let identity = CallerIdentity::resolve(caller, call_sid);
        info!(
            stream_sid,
            call_sid,
            caller = %identity,
            stable_identity = identity.is_stable(),
            "Call started"
        );

        self.stream_sid = Some(stream_sid.to_string());
        self.call_sid = Some(call_sid.to_string());
        self.caller = Some(identity);
        self.state = BridgeState::Active;

        vec![self.begin_setup(true)]
    }

    /// Inbound caller audio. Forwarded only once the AI session is open.
    pub fn on_telephony_audio(&mut self, payload: String) -> Vec<BridgeCommand> {
        if self.state == BridgeState::Active && self.ai_open {
            vec![BridgeCommand::ForwardToAi(payload)]
        } else {
            self.stats.caller_frames_dropped += 1;
            Vec::new()
        }
    }

    /// Outcome of a `ForwardToAi` command; the AI queue drops frames when full.
    pub fn record_forward(&mut self, queued: bool) {
        if queued {
            self.stats.caller_frames_forwarded += 1;
        } else {
            self.stats.caller_frames_dropped += 1;
        }
    }

    /// A mark we sent has played out.
    pub fn on_telephony_mark(&mut self, name: &str) -> Vec<BridgeCommand> {
        let matches = self
            .sequence
            .as_ref()
            .map_or(false, |sequence| sequence.mark_name == name);

        match self.sequence.take() {
            Some(sequence) if matches => {
                debug!(mark = name, intent = %sequence.intent, "Signal sequence played");
            }
            other => {
                self.sequence = other;
                debug!(mark = name, "Unmatched mark ignored");
            }
        }
        Vec::new()
    }

    pub fn on_telephony_stop(&mut self) -> Vec<BridgeCommand> {
        self.teardown("telephony stop", false)
    }

    /// The telephony connection went away without a stop signal.
    pub fn on_telephony_disconnected(&mut self) -> Vec<BridgeCommand> {
        self.teardown("telephony disconnected", false)
    }

    // ----- setup -----

    pub fn on_setup_completed(&mut self, attempt: u32) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active || attempt != self.setup_attempt {
            // teardown already happened; the fresh session must not outlive the call
            debug!(attempt, state = self.state.as_str(), "Discarding late AI session");
            return vec![BridgeCommand::CloseAi];
        }
        self.ai_open = true;
        info!(call_sid = ?self.call_sid, attempt, "AI session open, bridging audio");
        Vec::new()
    }

    pub fn on_setup_failed(&mut self, attempt: u32, error: &str) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active || attempt != self.setup_attempt {
            return Vec::new();
        }

        if attempt <= self.settings.setup_retries {
            warn!(call_sid = ?self.call_sid, attempt, error, "AI setup failed, retrying without personalization");
            return vec![self.begin_setup(false)];
        }

        warn!(call_sid = ?self.call_sid, attempt, error, "AI setup failed, giving up");
        self.teardown(&format!("AI setup failed: {}", error), true)
    }

    fn begin_setup(&mut self, personalized: bool) -> BridgeCommand {
        self.setup_attempt += 1;
        self.stats.setup_attempts += 1;
        BridgeCommand::BeginSetup {
            attempt: self.setup_attempt,
            personalized,
        }
    }

    // ----- AI side -----

    pub fn on_ai_audio(&mut self, payload: String) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active {
            debug!(state = self.state.as_str(), "Agent audio outside an active call, discarding");
            self.stats.agent_frames_discarded += 1;
            return Vec::new();
        }
        match &self.stream_sid {
            Some(stream_sid) => {
                self.stats.agent_frames_sent += 1;
                vec![BridgeCommand::Telephony(OutboundMessage::media(stream_sid, payload))]
            }
            None => {
                warn!("Agent audio before the stream id is known, discarding");
                self.stats.agent_frames_discarded += 1;
                Vec::new()
            }
        }
    }

    /// The caller spoke over the agent: flush everything queued for playback.
    pub fn on_ai_interruption(&mut self) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active {
            return Vec::new();
        }
        if let Some(sequence) = self.sequence.take() {
            info!(intent = %sequence.intent, "Signal sequence abandoned on interruption");
        }
        match &self.stream_sid {
            Some(stream_sid) => vec![BridgeCommand::Telephony(OutboundMessage::clear(stream_sid))],
            None => Vec::new(),
        }
    }

    pub fn on_ai_ping(&mut self, event_id: u64) -> Vec<BridgeCommand> {
        if self.state == BridgeState::Active && self.ai_open {
            vec![BridgeCommand::PongAi(event_id)]
        } else {
            Vec::new()
        }
    }

    /// Append a turn, then let the analyzer decide whether to send tones.
    pub fn on_transcript(&mut self, speaker: Speaker, text: String) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active {
            return Vec::new();
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }

        let in_progress = self.sequence.is_some();
        self.transcript.push(speaker, text);
        let turn = match self.transcript.turns().last() {
            Some(turn) => turn,
            None => return Vec::new(),
        };
        debug!(index = turn.index, speaker = turn.speaker.role(), "Transcript turn");

        if turn.speaker == Speaker::Caller && analyzer::detect_automated_system(&turn.text) {
            info!(call_sid = ?self.call_sid, "Answering machine or automated system detected");
        }

        let classification =
            match analyzer::classify(turn, self.transcript.turns(), in_progress) {
                Some(classification) => classification,
                None => return Vec::new(),
            };

        self.start_sequence(classification.action.intent(), classification.confidence)
    }

    fn start_sequence(&mut self, intent: SignalIntent, confidence: f32) -> Vec<BridgeCommand> {
        let stream_sid = match &self.stream_sid {
            Some(stream_sid) => stream_sid.clone(),
            None => return Vec::new(),
        };

        let rendered = self.synthesizer.render(intent);
        if rendered.is_empty() {
            return Vec::new();
        }

        self.next_sequence_id += 1;
        let sequence_id = self.next_sequence_id;
        let mark_name = format!("signal-{}", sequence_id);

        info!(
            call_sid = ?self.call_sid,
            %intent,
            confidence,
            symbols = ?rendered.symbols,
            "Sending signal sequence"
        );

        let mut commands: Vec<BridgeCommand> = rendered
            .frames
            .into_iter()
            .map(|frame| BridgeCommand::Telephony(OutboundMessage::media(&stream_sid, frame)))
            .collect();
        commands.push(BridgeCommand::Telephony(OutboundMessage::mark(
            &stream_sid,
            mark_name.clone(),
        )));
        commands.push(BridgeCommand::ScheduleSequenceCheck {
            sequence_id,
            after: rendered.duration + self.settings.sequence_grace,
        });

        self.sequence = Some(InFlightSequence {
            id: sequence_id,
            intent,
            mark_name,
        });
        self.stats.sequences_sent += 1;
        commands
    }

    /// Playback deadline passed; release the sequence if no mark came back.
    pub fn on_sequence_deadline(&mut self, sequence_id: u64) -> Vec<BridgeCommand> {
        if self.sequence.as_ref().map(|s| s.id) == Some(sequence_id) {
            debug!(sequence_id, "Signal sequence finished by deadline");
            self.sequence = None;
        }
        Vec::new()
    }

    pub fn on_ai_closed(&mut self) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active {
            return Vec::new();
        }
        warn!(call_sid = ?self.call_sid, "AI stream closed mid-call");
        self.ai_open = false;
        self.teardown("AI stream closed", true)
    }

    pub fn on_ai_error(&mut self, error: &str) -> Vec<BridgeCommand> {
        if self.state != BridgeState::Active {
            return Vec::new();
        }
        warn!(call_sid = ?self.call_sid, error, "AI stream failed mid-call");
        self.teardown(&format!("AI stream error: {}", error), true)
    }

    // ----- teardown -----

    /// Enter `Closing` and return the teardown commands.
    ///
    /// Persistence is only requested for calls that produced turns. The
    /// caller of this method moves the bridge to `Closed` via `mark_closed`
    /// once the commands have been executed.
    fn teardown(&mut self, reason: &str, close_telephony: bool) -> Vec<BridgeCommand> {
        match self.state {
            BridgeState::Closing | BridgeState::Closed => return Vec::new(),
            BridgeState::AwaitingStart => {
                self.state = BridgeState::Closing;
                self.close_reason = Some(reason.to_string());
                return if close_telephony { vec![BridgeCommand::CloseTelephony] } else { Vec::new() };
            }
            BridgeState::Active => {}
        }

        self.state = BridgeState::Closing;
        self.close_reason = Some(reason.to_string());
        self.sequence = None;
        self.ai_open = false;

        // a pending setup is also closed when its result arrives
        let mut commands = vec![BridgeCommand::CloseAi];

        if !self.transcript.is_empty() {
            if let (Some(call_id), Some(caller)) = (&self.call_sid, &self.caller) {
                commands.push(BridgeCommand::Persist {
                    call_id: call_id.clone(),
                    caller: caller.clone(),
                    turns: self.transcript.snapshot(),
                });
            }
        }

        if close_telephony {
            commands.push(BridgeCommand::CloseTelephony);
        }
        commands
    }

    /// Teardown commands have run.
    pub fn mark_closed(&mut self) {
        if self.state == BridgeState::Closing {
            self.state = BridgeState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> CallBridge {
        let mut bridge = CallBridge::new(BridgeSettings::default());
        let commands = bridge.on_telephony_start("MZ1", "CA1", Some("+15550001111"));
        assert_eq!(
            commands,
            vec![BridgeCommand::BeginSetup { attempt: 1, personalized: true }]
        );
        bridge
    }

    fn open() -> CallBridge {
        let mut bridge = started();
        assert!(bridge.on_setup_completed(1).is_empty());
        bridge
    }

    fn telephony_messages(commands: &[BridgeCommand]) -> Vec<&OutboundMessage> {
        commands
            .iter()
            .filter_map(|command| match command {
                BridgeCommand::Telephony(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_resolves_identity() {
        let bridge = started();
        assert_eq!(bridge.state(), BridgeState::Active);
        assert_eq!(bridge.stream_sid(), Some("MZ1"));
        assert_eq!(bridge.call_sid(), Some("CA1"));
        assert_eq!(
            bridge.caller(),
            Some(&CallerIdentity::Phone("+15550001111".to_string()))
        );

        let mut anonymous = CallBridge::new(BridgeSettings::default());
        anonymous.on_telephony_start("MZ2", "CA2", None);
        assert_eq!(
            anonymous.caller(),
            Some(&CallerIdentity::CallFallback("CA2".to_string()))
        );
    }

    #[test]
    fn test_duplicate_start_is_ignored() {
        let mut bridge = started();
        assert!(bridge.on_telephony_start("MZ9", "CA9", None).is_empty());
        assert_eq!(bridge.stream_sid(), Some("MZ1"));
    }

    #[test]
    fn test_audio_dropped_until_ai_open() {
        let mut bridge = started();
        assert!(bridge.on_telephony_audio("early".to_string()).is_empty());
        assert_eq!(bridge.stats().caller_frames_dropped, 1);

        bridge.on_setup_completed(1);
        assert_eq!(
            bridge.on_telephony_audio("live".to_string()),
            vec![BridgeCommand::ForwardToAi("live".to_string())]
        );
        bridge.record_forward(true);
        bridge.record_forward(false);
        assert_eq!(bridge.stats().caller_frames_forwarded, 1);
        assert_eq!(bridge.stats().caller_frames_dropped, 2);
    }

    #[test]
    fn test_audio_before_start_is_dropped() {
        let mut bridge = CallBridge::new(BridgeSettings::default());
        assert!(bridge.on_telephony_audio("x".to_string()).is_empty());
        assert!(bridge.on_ai_audio("y".to_string()).is_empty());
        assert_eq!(bridge.stats().agent_frames_discarded, 1);
    }

    #[test]
    fn test_setup_failure_retries_once_without_personalization() {
        let mut bridge = started();
        assert_eq!(
            bridge.on_setup_failed(1, "refused"),
            vec![BridgeCommand::BeginSetup { attempt: 2, personalized: false }]
        );
        assert_eq!(bridge.state(), BridgeState::Active);

        // stale result from the first attempt is discarded
        assert_eq!(bridge.on_setup_completed(1), vec![BridgeCommand::CloseAi]);
        assert!(!bridge.is_ai_open());

        assert!(bridge.on_setup_completed(2).is_empty());
        assert!(bridge.is_ai_open());
    }

    #[test]
    fn test_setup_gives_up_after_retry() {
        let mut bridge = started();
        bridge.on_setup_failed(1, "refused");
        let commands = bridge.on_setup_failed(2, "refused again");

        assert_eq!(bridge.state(), BridgeState::Closing);
        assert!(commands.contains(&BridgeCommand::CloseTelephony));
        assert!(!commands.iter().any(|c| matches!(c, BridgeCommand::Persist { .. })));
        assert!(bridge.close_reason().unwrap().contains("refused again"));
        assert_eq!(bridge.stats().setup_attempts, 2);
    }

    #[test]
    fn test_stop_while_setup_pending() {
        let mut bridge = started();
        bridge.on_telephony_audio("a".to_string());

        let commands = bridge.on_telephony_stop();
        assert_eq!(commands, vec![BridgeCommand::CloseAi]);
        assert_eq!(bridge.state(), BridgeState::Closing);
        bridge.mark_closed();
        assert_eq!(bridge.state(), BridgeState::Closed);

        // the session that finishes opening afterwards is closed, never used
        assert_eq!(bridge.on_setup_completed(1), vec![BridgeCommand::CloseAi]);
        assert!(bridge.on_telephony_audio("b".to_string()).is_empty());
        assert_eq!(bridge.stats().caller_frames_forwarded, 0);
    }

    #[test]
    fn test_stop_persists_transcript_once() {
        let mut bridge = open();
        bridge.on_transcript(Speaker::Agent, "Hello! How can I help you today?".to_string());
        bridge.on_transcript(Speaker::Caller, "Move my 9am appointment".to_string());

        let commands = bridge.on_telephony_stop();
        let persisted: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                BridgeCommand::Persist { call_id, caller, turns } => Some((call_id, caller, turns)),
                _ => None,
            })
            .collect();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0, "CA1");
        assert_eq!(persisted[0].2.len(), 2);
        assert!(commands.contains(&BridgeCommand::CloseAi));
        assert!(!commands.contains(&BridgeCommand::CloseTelephony));

        // a second stop or disconnect does nothing
        assert!(bridge.on_telephony_stop().is_empty());
        assert!(bridge.on_telephony_disconnected().is_empty());
    }

    #[test]
    fn test_agent_audio_routed_to_stream() {
        let mut bridge = open();
        let commands = bridge.on_ai_audio("AAAA".to_string());
        assert_eq!(
            commands,
            vec![BridgeCommand::Telephony(OutboundMessage::media("MZ1", "AAAA".to_string()))]
        );
        assert_eq!(bridge.stats().agent_frames_sent, 1);
    }

    #[test]
    fn test_agent_audio_after_teardown_is_discarded() {
        let mut bridge = open();
        bridge.on_telephony_stop();
        bridge.mark_closed();

        assert!(bridge.on_ai_audio("late".to_string()).is_empty());
        assert_eq!(bridge.stats().agent_frames_sent, 0);
        assert_eq!(bridge.stats().agent_frames_discarded, 1);
    }

    #[test]
    fn test_ping_answered_only_when_open() {
        let mut bridge = started();
        assert!(bridge.on_ai_ping(3).is_empty());
        bridge.on_setup_completed(1);
        assert_eq!(bridge.on_ai_ping(4), vec![BridgeCommand::PongAi(4)]);
    }

    #[test]
    fn test_transcript_is_append_only() {
        let mut bridge = open();
        let texts = ["Hi there", "Hello", "", "   ", "What are your hours?"];
        let mut last_len = 0;
        for (n, text) in texts.iter().enumerate() {
            let speaker = if n % 2 == 0 { Speaker::Caller } else { Speaker::Agent };
            bridge.on_transcript(speaker, text.to_string());
            assert!(bridge.transcript().len() >= last_len);
            last_len = bridge.transcript().len();
        }
        let recorded: Vec<&str> =
            bridge.transcript().turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(recorded, vec!["Hi there", "Hello", "What are your hours?"]);
        assert!(bridge.transcript().turns().iter().enumerate().all(|(i, t)| t.index == i));
    }

    #[test]
    fn test_voicemail_prompt_sends_pound_sequence() {
        let mut bridge = open();
        let commands =
            bridge.on_transcript(Speaker::Caller, "Please leave a message after the tone".to_string());

        let messages = telephony_messages(&commands);
        // 100ms tone = 5 frames, then the closing mark
        assert_eq!(messages.len(), 6);
        assert!(matches!(messages[5], OutboundMessage::Mark { mark, .. } if mark.name == "signal-1"));
        assert!(matches!(
            commands.last(),
            Some(BridgeCommand::ScheduleSequenceCheck { sequence_id: 1, after })
                if *after == Duration::from_millis(600)
        ));
        assert!(bridge.sequence_in_progress());
        assert_eq!(bridge.stats().sequences_sent, 1);
    }

    #[test]
    fn test_second_sequence_suppressed_while_in_flight() {
        let mut bridge = open();
        bridge.on_transcript(Speaker::Caller, "Please leave a message after the tone".to_string());
        let second = bridge.on_transcript(Speaker::Caller, "Press 0 for an operator".to_string());
        assert!(second.is_empty());
        assert_eq!(bridge.stats().sequences_sent, 1);

        // the mark echo releases the sequence
        bridge.on_telephony_mark("signal-1");
        assert!(!bridge.sequence_in_progress());
        let third = bridge.on_transcript(Speaker::Caller, "Press 0 for an operator".to_string());
        assert!(!third.is_empty());
        assert_eq!(bridge.stats().sequences_sent, 2);
    }

    #[test]
    fn test_sequence_deadline_releases_only_matching_sequence() {
        let mut bridge = open();
        bridge.on_transcript(Speaker::Caller, "Please leave a message after the tone".to_string());
        bridge.on_sequence_deadline(99);
        assert!(bridge.sequence_in_progress());
        bridge.on_sequence_deadline(1);
        assert!(!bridge.sequence_in_progress());
    }

    #[test]
    fn test_interruption_clears_and_abandons_sequence() {
        let mut bridge = open();
        bridge.on_transcript(Speaker::Caller, "Please leave a message after the tone".to_string());
        bridge.on_ai_audio("queued".to_string());

        let commands = bridge.on_ai_interruption();
        assert_eq!(
            commands,
            vec![BridgeCommand::Telephony(OutboundMessage::clear("MZ1"))]
        );
        assert!(!bridge.sequence_in_progress());
    }

    #[test]
    fn test_agent_speech_never_triggers_tones() {
        let mut bridge = open();
        let commands =
            bridge.on_transcript(Speaker::Agent, "Please leave a message after the tone".to_string());
        assert!(commands.is_empty());
        assert_eq!(bridge.transcript().len(), 1);
    }

    #[test]
    fn test_ai_failure_mid_call_tears_down() {
        let mut bridge = open();
        bridge.on_transcript(Speaker::Caller, "Hello?".to_string());
        let commands = bridge.on_ai_error("connection reset");

        assert_eq!(bridge.state(), BridgeState::Closing);
        assert!(commands.contains(&BridgeCommand::CloseAi));
        assert!(commands.contains(&BridgeCommand::CloseTelephony));
        assert!(commands.iter().any(|c| matches!(c, BridgeCommand::Persist { .. })));

        // the closed event that follows our own close is ignored
        bridge.mark_closed();
        assert!(bridge.on_ai_closed().is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let config = BridgeConfig {
            setup_retries: 2,
            tone_duration_ms: 80,
            inter_tone_gap_ms: 120,
            tone_amplitude: 0.3,
            sequence_grace_ms: 250,
        };
        let settings = BridgeSettings::from(&config);
        assert_eq!(settings.setup_retries, 2);
        assert_eq!(settings.sequence_grace, Duration::from_millis(250));
        assert_eq!(settings.tones.tone_ms, 80);
    }
}
