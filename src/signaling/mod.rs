//! # In-Band Signaling
//!
//! Detects automated far ends (voicemail, IVR menus) from the live transcript
//! and produces the DTMF sequences used to navigate them.
//!
//! ## Key Components:
//! - **Analyzer**: keyword classifier over caller turns
//! - **Tones**: dual-tone synthesis and frame rendering
//! - **SignalIntent**: the static intent → symbol table

pub mod analyzer;   // Transcript classification
pub mod tones;      // DTMF synthesis

use serde::Serialize;
use std::fmt;

/// Navigation action chosen by the analyzer for a caller turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    NavigateMenu,
    StartRecording,
    RequestHuman,
}

impl NavigationAction {
    /// Intent whose sequence carries out this action.
    pub fn intent(self) -> SignalIntent {
        match self {
            NavigationAction::NavigateMenu => SignalIntent::AutomatedMenu,
            NavigationAction::StartRecording => SignalIntent::VoicemailRecord,
            NavigationAction::RequestHuman => SignalIntent::AutomatedMenu,
        }
    }
}

/// Named navigation intents and their keypad sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalIntent {
    /// Skip a voicemail greeting
    VoicemailSkip,
    /// Start recording after the greeting
    VoicemailRecord,
    /// Ask a menu for an operator
    AutomatedMenu,
    AppointmentConfirm,
    CallbackRequest,
}

impl SignalIntent {
    pub fn symbols(self) -> &'static [char] {
        match self {
            SignalIntent::VoicemailSkip => &['1'],
            SignalIntent::VoicemailRecord => &['#'],
            SignalIntent::AutomatedMenu => &['0'],
            SignalIntent::AppointmentConfirm => &['1'],
            SignalIntent::CallbackRequest => &['2', '1'],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalIntent::VoicemailSkip => "voicemail_skip",
            SignalIntent::VoicemailRecord => "voicemail_record",
            SignalIntent::AutomatedMenu => "automated_menu",
            SignalIntent::AppointmentConfirm => "appointment_confirm",
            SignalIntent::CallbackRequest => "callback_request",
        }
    }
}

impl fmt::Display for SignalIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_intent_mapping() {
        assert_eq!(NavigationAction::StartRecording.intent().symbols(), &['#']);
        assert_eq!(NavigationAction::RequestHuman.intent().symbols(), &['0']);
        assert_eq!(NavigationAction::NavigateMenu.intent(), SignalIntent::AutomatedMenu);
    }

    #[test]
    fn test_intent_names() {
        assert_eq!(SignalIntent::CallbackRequest.to_string(), "callback_request");
        assert_eq!(
            serde_json::to_string(&SignalIntent::VoicemailSkip).unwrap(),
            "\"voicemail_skip\""
        );
    }
}
