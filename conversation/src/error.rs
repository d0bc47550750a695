//! Error taxonomy for the conversation coordinator.
//!
//! Recoverable kinds (a generation failure below the retry bound, an
//! unparseable verdict, a forced Expert override) are handled inside the
//! coordinator and only show up in logs and diagnostics counters. Everything
//! else ends the session in `Failed` and is surfaced to the observer as a
//! single terminal event carrying the [`ErrorKind`] and the last known phase.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{GenerationFailure, Role};
use crate::session::{Phase, TransitionError};

/// Closed set of error kinds a session can encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generation dependency failed or timed out.
    GenerationFailure,
    /// A Reader or Expert reply did not match the expected verdict shape.
    UnparseableVerdict,
    /// Writer/Reader exchanges hit the ceiling and an Expert ruling was forced.
    DisputeCeilingExceeded,
    /// The session was cancelled by its owner.
    CancellationRequested,
    /// An internal invariant was breached.
    ScheduleViolation,
}

impl ErrorKind {
    /// Whether the coordinator handles this kind locally without failing the session.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::UnparseableVerdict | Self::DisputeCeilingExceeded
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerationFailure => write!(f, "generation_failure"),
            Self::UnparseableVerdict => write!(f, "unparseable_verdict"),
            Self::DisputeCeilingExceeded => write!(f, "dispute_ceiling_exceeded"),
            Self::CancellationRequested => write!(f, "cancellation_requested"),
            Self::ScheduleViolation => write!(f, "schedule_violation"),
        }
    }
}

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that terminate a session.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A role exhausted its retry budget for a single turn.
    #[error("{role} failed to respond to '{directive}' after {attempts} attempt(s): {message}")]
    GenerationFailure {
        role: Role,
        directive: String,
        attempts: u32,
        message: String,
    },

    /// Cooperative cancellation observed at a suspension point.
    #[error("cancellation requested")]
    Cancelled,

    /// Invariant breach; always an implementation bug.
    #[error("schedule violation in {phase}: {message}")]
    ScheduleViolation { phase: Phase, message: String },
}

impl CoordinatorError {
    /// Create a schedule violation error.
    pub fn violation(phase: Phase, message: impl Into<String>) -> Self {
        Self::ScheduleViolation {
            phase,
            message: message.into(),
        }
    }

    /// Build the terminal error from the last failure of a turn.
    pub fn exhausted(failure: &GenerationFailure, attempts: u32) -> Self {
        Self::GenerationFailure {
            role: failure.role,
            directive: failure.directive.clone(),
            attempts,
            message: failure.source.to_string(),
        }
    }

    /// The kind reported to observers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GenerationFailure { .. } => ErrorKind::GenerationFailure,
            Self::Cancelled => ErrorKind::CancellationRequested,
            Self::ScheduleViolation { .. } => ErrorKind::ScheduleViolation,
        }
    }
}

impl From<TransitionError> for CoordinatorError {
    fn from(err: TransitionError) -> Self {
        Self::ScheduleViolation {
            phase: err.from,
            message: err.to_string(),
        }
    }
}
