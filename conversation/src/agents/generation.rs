//! Generation dependency seam.
//!
//! A [`Generator`] turns a persona, a history and a directive into text,
//! either as a complete reply or as a stream of fragments. Both shapes are
//! normalised into a [`FragmentStream`] that must end with [`Fragment::End`];
//! the coordinator treats a reply as pending until that marker arrives.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::Role;

/// Errors raised by a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("reply ended without an end marker")]
    MissingEndMarker,

    #[error("turn timed out after {0}s")]
    Timeout(u64),
}

/// A failed turn, as surfaced by a role agent. Never retried by the agent itself.
#[derive(Debug, Clone, Error)]
#[error("{role} failed on '{directive}': {source}")]
pub struct GenerationFailure {
    pub role: Role,
    pub directive: String,
    #[source]
    pub source: GenerationError,
}

/// One piece of an incremental reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// Explicit terminal marker. Nothing follows it.
    End,
}

/// Finite, non-restartable sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, GenerationError>> + Send>>;

/// What a backend hands back.
pub enum Reply {
    /// Blocking mode: the full text at once.
    Complete(String),
    /// Incremental mode.
    Stream(FragmentStream),
}

impl Reply {
    /// Normalise either mode into a fragment stream ending in [`Fragment::End`].
    pub fn into_fragments(self) -> FragmentStream {
        match self {
            Self::Complete(text) => Box::pin(stream::iter(vec![
                Ok(Fragment::Text(text)),
                Ok(Fragment::End),
            ])),
            Self::Stream(s) => s,
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A prior turn as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Role,
    pub content: String,
}

/// Everything a backend needs for one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Role that will speak.
    pub role: Role,
    /// Immutable persona template, rendered for this session.
    pub persona: String,
    pub history: Vec<HistoryEntry>,
    /// What is being asked in this turn.
    pub directive: String,
}

/// Text-generation capability. Implementations must be stateless across calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Reply, GenerationError>;
}
