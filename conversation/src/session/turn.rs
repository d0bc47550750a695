//! Append-only turn log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::Phase;
use crate::agents::Role;

/// One utterance by one role. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based, gapless within a session.
    pub seq: u64,
    pub speaker: Role,
    /// Phase at the time of utterance.
    pub phase: Phase,
    pub content: String,
    /// Wall time spent producing the reply, retries included.
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Arena of turns referenced by index. Nothing is ever removed or edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnLog {
    turns: Vec<Turn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it. The sequence number is assigned here.
    pub fn push(&mut self, speaker: Role, phase: Phase, content: String, elapsed_ms: u64) -> &Turn {
        let seq = self.turns.len() as u64 + 1;
        self.turns.push(Turn {
            seq,
            speaker,
            phase,
            content,
            elapsed_ms,
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Most recent turn by `speaker`.
    pub fn last_by(&self, speaker: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.speaker == speaker)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}
