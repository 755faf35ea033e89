//! Conversation transcript: an ordered log of speaker turns.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person at the microphone.
    User,
    /// The remote model.
    Model,
}

/// One contiguous utterance attributed to a single speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Chronological list of turns, merged per speaker as deltas arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Apply a transcription delta and return the index of the touched turn.
    ///
    /// A delta from the speaker of the last turn extends it; any other delta
    /// opens a new turn.
    pub fn append_delta(&mut self, speaker: Speaker, text: &str) -> usize {
        match self.turns.last_mut() {
            Some(last) if last.speaker == speaker => last.text.push_str(text),
            _ => self.turns.push(ConversationTurn {
                speaker,
                text: text.to_string(),
            }),
        }
        self.turns.len() - 1
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// The most recent turn with visible text.
    pub fn last_spoken(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| !t.text.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
