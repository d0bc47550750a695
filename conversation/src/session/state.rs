//! Session state machine: phases, transitions, and owned session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::draft::Draft;
use super::turn::{Turn, TurnLog};
use super::SessionId;
use crate::agents::{Role, SessionView};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::request::StoryRequest;
use crate::schedule::{Checkpoint, CheckpointOutcome, CheckpointSchedule, CheckpointStatus};

/// Phase of a story session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Writer is producing the outline.
    Outlining,
    /// Reader is judging the outline.
    OutlineReview,
    /// Writer is extending the draft toward the next checkpoint.
    Drafting,
    /// Reader is judging the segment since the last checkpoint.
    CheckpointReview,
    /// Expert is issuing a binding ruling.
    Dispute,
    /// Expert closing pass over the full draft.
    Finalizing,
    /// Artifact produced.
    Finalized,
    /// Unrecoverable error or cancellation. No artifact.
    Failed,
}

impl Phase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Outlining => &[Self::OutlineReview, Self::Failed],
            Self::OutlineReview => &[Self::Outlining, Self::Drafting, Self::Dispute, Self::Failed],
            Self::Drafting => &[Self::CheckpointReview, Self::Finalizing, Self::Failed],
            Self::CheckpointReview => &[Self::Drafting, Self::Dispute, Self::Finalizing, Self::Failed],
            Self::Dispute => &[Self::Drafting, Self::Finalizing, Self::Failed],
            Self::Finalizing => &[Self::Finalized, Self::Failed],
            Self::Finalized | Self::Failed => &[],
        }
    }

    /// Whether the same role may speak twice in a row in this phase.
    /// Only Drafting, where the Writer continues across turns.
    pub fn allows_self_continuation(self) -> bool {
        matches!(self, Self::Drafting)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outlining => write!(f, "outlining"),
            Self::OutlineReview => write!(f, "outline_review"),
            Self::Drafting => write!(f, "drafting"),
            Self::CheckpointReview => write!(f, "checkpoint_review"),
            Self::Dispute => write!(f, "dispute"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Finalized => write!(f, "finalized"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
    pub reason: String,
}

/// Counters for locally handled recoverable errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Turn attempts that failed and were retried.
    pub retries: u32,
    /// Attempts that hit the per-turn timeout.
    pub timeouts: u32,
    /// Verdicts or rulings that could not be parsed.
    pub unparseable_verdicts: u32,
    /// Disputes forced by the review ceiling.
    pub forced_disputes: u32,
}

/// One story session. Exclusively owned by its coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub request: StoryRequest,
    phase: Phase,
    turns: TurnLog,
    checkpoints: Vec<Checkpoint>,
    current_checkpoint: usize,
    outline: Option<String>,
    pub draft: Draft,
    final_artifact: Option<String>,
    /// Reader request-changes rounds for the outline or current checkpoint.
    pub dispute_count: u32,
    transitions: Vec<PhaseTransition>,
    pub diagnostics: Diagnostics,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in `Outlining` with its checkpoints derived once.
    pub fn new(id: SessionId, request: StoryRequest) -> Self {
        let checkpoints = CheckpointSchedule::for_length(request.target_length()).checkpoints();
        Self {
            id,
            request,
            phase: Phase::Outlining,
            turns: TurnLog::new(),
            checkpoints,
            current_checkpoint: 0,
            outline: None,
            draft: Draft::new(),
            final_artifact: None,
            dispute_count: 0,
            transitions: Vec::new(),
            diagnostics: Diagnostics::default(),
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turns(&self) -> &TurnLog {
        &self.turns
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn current_checkpoint(&self) -> usize {
        self.current_checkpoint
    }

    /// The next checkpoint not yet passed.
    pub fn next_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.get(self.current_checkpoint)
    }

    pub fn checkpoints_remaining(&self) -> usize {
        self.checkpoints.len() - self.current_checkpoint
    }

    /// Every checkpoint passed and the draft at or past the target length.
    pub fn draft_complete(&self, words_per_unit: u32) -> bool {
        self.checkpoints_remaining() == 0
            && self.draft.words() >= self.request.total_words(words_per_unit) as usize
    }

    /// Pending checkpoints whose word target the draft has reached.
    pub fn reached_checkpoints(&self, words_per_unit: u32) -> usize {
        let words = self.draft.words();
        self.checkpoints[self.current_checkpoint..]
            .iter()
            .take_while(|c| c.word_target(words_per_unit) <= words)
            .count()
    }

    pub fn outline(&self) -> Option<&str> {
        self.outline.as_deref()
    }

    pub fn final_artifact(&self) -> Option<&str> {
        self.final_artifact.as_deref()
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Read-only projection for a role agent.
    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            request: &self.request,
            phase: self.phase,
            turns: self.turns.as_slice(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: Phase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Append a turn in the current phase.
    ///
    /// Rejects a second consecutive turn by the same speaker unless the
    /// phase allows self-continuation.
    pub fn append_turn(
        &mut self,
        speaker: Role,
        content: String,
        elapsed_ms: u64,
    ) -> CoordinatorResult<&Turn> {
        if self.phase.is_terminal() {
            return Err(CoordinatorError::violation(
                self.phase,
                "turn appended after terminal phase",
            ));
        }
        if let Some(last) = self.turns.last() {
            if last.speaker == speaker && !self.phase.allows_self_continuation() {
                return Err(CoordinatorError::violation(
                    self.phase,
                    format!("{speaker} spoke twice in a row in {}", self.phase),
                ));
            }
        }
        Ok(self.turns.push(speaker, self.phase, content, elapsed_ms))
    }

    /// Set the approved outline. Only once.
    pub fn set_outline(&mut self, outline: String) -> CoordinatorResult<()> {
        if self.outline.is_some() {
            return Err(CoordinatorError::violation(self.phase, "outline already set"));
        }
        self.outline = Some(outline);
        Ok(())
    }

    /// Close the current checkpoint and move the index forward by one.
    pub fn advance_checkpoint(&mut self, outcome: CheckpointOutcome) -> CoordinatorResult<usize> {
        let index = self.current_checkpoint;
        let checkpoint = self.checkpoints.get_mut(index).ok_or_else(|| {
            CoordinatorError::violation(
                self.phase,
                format!("checkpoint index {index} past end of schedule"),
            )
        })?;
        if checkpoint.status == CheckpointStatus::Passed {
            return Err(CoordinatorError::violation(
                self.phase,
                format!("checkpoint {index} already passed"),
            ));
        }
        checkpoint.status = CheckpointStatus::Passed;
        checkpoint.outcome = outcome;
        self.current_checkpoint = index + 1;
        Ok(self.current_checkpoint)
    }

    /// Set the final artifact. Only once, and only in `Finalized`.
    pub fn set_artifact(&mut self, artifact: String) -> CoordinatorResult<()> {
        if self.phase != Phase::Finalized {
            return Err(CoordinatorError::violation(
                self.phase,
                "artifact set outside finalized phase",
            ));
        }
        if self.final_artifact.is_some() {
            return Err(CoordinatorError::violation(self.phase, "artifact already set"));
        }
        if artifact.trim().is_empty() {
            return Err(CoordinatorError::violation(self.phase, "empty artifact"));
        }
        self.final_artifact = Some(artifact);
        Ok(())
    }
}
