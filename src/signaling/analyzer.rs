//! # Conversation Analyzer
//!
//! Stateless keyword classifier that looks at what the far end says and
//! decides whether an automated system (voicemail, IVR menu) is on the line.
//!
//! ## Rules:
//! - Only caller turns are classified; agent speech never triggers navigation
//! - At most one action per turn, priority `StartRecording > RequestHuman > NavigateMenu`
//! - Nothing is returned while a signal sequence is already in progress

use crate::bridge::transcript::{Speaker, TranscriptTurn};
use crate::signaling::NavigationAction;

const RECORDING_CUES: &[&str] = &[
    "beep",
    "after the tone",
    "at the tone",
    "record your message",
    "leave a message",
    "leave your message",
];

const HUMAN_CUES: &[&str] = &["operator", "representative", "live person", "real person"];

const MENU_CUES: &[&str] = &["following options", "menu options", "main menu"];

/// Phrases that mark the far end as an answering machine or automated system.
const AUTOMATED_INDICATORS: &[&str] = &[
    "voicemail",
    "leave a message",
    "after the beep",
    "press 1 for",
    "press 0 for operator",
    "automated system",
];

/// Result of classifying one caller turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub action: NavigationAction,
    /// Heuristic confidence in [0, 1]
    pub confidence: f32,
}

/// Whether the text carries any answering-machine indicator.
pub fn detect_automated_system(text: &str) -> bool {
    let lowered = text.to_lowercase();
    AUTOMATED_INDICATORS.iter().any(|indicator| lowered.contains(indicator))
}

/// Classify the latest turn.
///
/// ## Parameters:
/// - **latest**: the turn just appended to the transcript
/// - **history**: all earlier turns of the session (may include `latest`)
/// - **sequence_in_progress**: whether a signal sequence is still playing
pub fn classify(
    latest: &TranscriptTurn,
    history: &[TranscriptTurn],
    sequence_in_progress: bool,
) -> Option<Classification> {
    if sequence_in_progress || latest.speaker != Speaker::Caller {
        return None;
    }

    let content = latest.text.to_lowercase();
    let (action, base) = if contains_any(&content, RECORDING_CUES) {
        (NavigationAction::StartRecording, 0.90)
    } else if contains_any(&content, HUMAN_CUES) {
        (NavigationAction::RequestHuman, 0.85)
    } else if is_menu_prompt(&content) {
        (NavigationAction::NavigateMenu, 0.80)
    } else {
        return None;
    };

    let seen_before = history
        .iter()
        .filter(|turn| turn.index < latest.index && turn.speaker == Speaker::Caller)
        .any(|turn| detect_automated_system(&turn.text));

    let confidence = if seen_before { (base + 0.05f32).min(0.99) } else { base };

    Some(Classification { action, confidence })
}

fn contains_any(content: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| content.contains(cue))
}

/// "Press N for ..." style prompts, or explicit menu wording.
fn is_menu_prompt(content: &str) -> bool {
    let words: Vec<&str> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let press = words.iter().position(|w| *w == "press");
    let has_for_after_press = press
        .map(|at| words[at..].iter().any(|w| *w == "for"))
        .unwrap_or(false);

    has_for_after_press || contains_any(content, MENU_CUES)
}
