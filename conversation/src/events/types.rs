//! Observable session events.
//!
//! Every event carries the session id, a per-session sequence number and a
//! timestamp; the payload is flattened next to them and tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::Role;
use crate::dispute::{DisputeSubject, Ruling};
use crate::error::ErrorKind;
use crate::session::{Phase, SessionId};

/// One event on a session's observer channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    /// 1-based, gapless within a session.
    pub seq: u64,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// The session entered a phase, or has a notice for observers.
    Status { phase: Phase, message: String },

    /// A role began working on a directive.
    ///
    /// `attempt > 1` marks a retry: fragments streamed since the previous
    /// `agent-turn-started` for this turn belong to the abandoned attempt and
    /// should be discarded by observers.
    AgentTurnStarted {
        speaker: Role,
        phase: Phase,
        directive: String,
        attempt: u32,
    },

    /// Incremental reply text.
    AgentTurnFragment {
        speaker: Role,
        phase: Phase,
        content: String,
    },

    /// A reply was appended to the turn log.
    AgentTurnComplete {
        speaker: Role,
        phase: Phase,
        turn_seq: u64,
        content: String,
    },

    /// The draft reached a scheduled checkpoint.
    CheckpointReached {
        phase: Phase,
        /// 1-based.
        index: usize,
        total: usize,
        words: usize,
    },

    /// Writer and Reader could not converge.
    DisputeOpened {
        phase: Phase,
        subject: DisputeSubject,
        review_rounds: u32,
    },

    /// The Expert ruled.
    DisputeResolved {
        phase: Phase,
        subject: DisputeSubject,
        ruling: Ruling,
    },

    /// Terminal: the artifact is ready.
    Completed { phase: Phase, artifact: String },

    /// Terminal: no artifact.
    Failed {
        phase: Phase,
        error_kind: ErrorKind,
        message: String,
    },
}

impl EventKind {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::AgentTurnStarted { .. } => "agent-turn-started",
            Self::AgentTurnFragment { .. } => "agent-turn-fragment",
            Self::AgentTurnComplete { .. } => "agent-turn-complete",
            Self::CheckpointReached { .. } => "checkpoint-reached",
            Self::DisputeOpened { .. } => "dispute-opened",
            Self::DisputeResolved { .. } => "dispute-resolved",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn speaker(&self) -> Option<Role> {
        match self {
            Self::AgentTurnStarted { speaker, .. }
            | Self::AgentTurnFragment { speaker, .. }
            | Self::AgentTurnComplete { speaker, .. } => Some(*speaker),
            Self::DisputeResolved { .. } => Some(Role::Expert),
            _ => None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Status { phase, .. }
            | Self::AgentTurnStarted { phase, .. }
            | Self::AgentTurnFragment { phase, .. }
            | Self::AgentTurnComplete { phase, .. }
            | Self::CheckpointReached { phase, .. }
            | Self::DisputeOpened { phase, .. }
            | Self::DisputeResolved { phase, .. }
            | Self::Completed { phase, .. }
            | Self::Failed { phase, .. } => *phase,
        }
    }

    /// Text payload, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Failed { message, .. } => Some(message),
            Self::AgentTurnFragment { content, .. } | Self::AgentTurnComplete { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::Completed { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

impl StoryEvent {
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = StoryEvent {
            seq: 4,
            session_id: SessionId::new(),
            timestamp: Utc::now(),
            kind: EventKind::AgentTurnFragment {
                speaker: Role::Writer,
                phase: Phase::Drafting,
                content: "The lights".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent-turn-fragment");
        assert_eq!(json["speaker"], "writer");
        assert_eq!(json["phase"], "drafting");
        assert_eq!(json["seq"], 4);

        let back: StoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_failed_event_carries_kind_and_phase() {
        let kind = EventKind::Failed {
            phase: Phase::CheckpointReview,
            error_kind: ErrorKind::GenerationFailure,
            message: "reader gave up".into(),
        };
        assert!(kind.is_terminal());
        assert_eq!(kind.event_type(), "failed");
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["error_kind"], "generation_failure");
        assert_eq!(json["phase"], "checkpoint_review");
    }

    #[test]
    fn test_accessors() {
        let kind = EventKind::Completed {
            phase: Phase::Finalized,
            artifact: "story".into(),
        };
        assert_eq!(kind.artifact(), Some("story"));
        assert!(kind.speaker().is_none());
        let kind = EventKind::DisputeResolved {
            phase: Phase::Dispute,
            subject: DisputeSubject::Outline,
            ruling: Ruling::AcceptAsIs,
        };
        assert_eq!(kind.speaker(), Some(Role::Expert));
    }
}
