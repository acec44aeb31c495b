//! Call transcript: attributed turns in AI-transport delivery order.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Agent,
    Caller,
}

impl Speaker {
    /// Chat role used when the transcript is stored.
    pub fn role(self) -> &'static str {
        match self {
            Speaker::Agent => "assistant",
            Speaker::Caller => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    /// Position in the transcript, starting at 0
    pub index: usize,
}

/// Append-only transcript buffer.
///
/// Turns can only be pushed; indices are assigned here so they always match
/// arrival order.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return a reference to it.
    pub fn push(&mut self, speaker: Speaker, text: String) -> &TranscriptTurn {
        let index = self.turns.len();
        self.turns.push(TranscriptTurn { speaker, text, index });
        &self.turns[index]
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Copy of all turns, for hand-off at call end.
    pub fn snapshot(&self) -> Vec<TranscriptTurn> {
        self.turns.clone()
    }
}
