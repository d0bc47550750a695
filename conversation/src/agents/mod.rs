//! Role agents and the generation dependency they wrap.
//!
//! The three roles form a closed set dispatched through [`Role`]; each
//! [`RoleAgent`] pairs a role with a shared [`Generator`] and keeps no
//! per-session state, so one [`AgentPool`] serves every concurrent session.

pub mod generation;
pub mod openai;
pub mod prompts;
pub mod role;

pub use generation::{
    Fragment, FragmentStream, GenerationError, GenerationFailure, GenerationRequest, Generator,
    HistoryEntry, Reply,
};
pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use role::{AgentPool, Directive, Role, RoleAgent, SessionView};
