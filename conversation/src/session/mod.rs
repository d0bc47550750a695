//! Per-session state: phase machine, turn log, and draft.

pub mod draft;
pub mod state;
pub mod turn;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use draft::{extract_story_segment, word_count, Draft};
pub use state::{Diagnostics, Phase, PhaseTransition, Session, TransitionError};
pub use turn::{Turn, TurnLog};

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
