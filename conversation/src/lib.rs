//! Story Conversation Library
//!
//! Coordinates a three-party story-writing dialogue: a Writer drafts, a
//! Reader reviews at checkpoints, and an Expert settles disputes and makes
//! the closing pass. Every session is driven by its own
//! [`ConversationCoordinator`] and streams ordered events to one observer.
//!
//! # Components
//!
//! - [`request`]: `StoryRequest` and style knobs
//! - [`schedule`]: checkpoint placement proportional to target length
//! - [`agents`]: role personas, directives, and the `Generator` seam
//! - [`verdict`] / [`dispute`]: review and ruling parsing
//! - [`session`]: phases, turn log, and draft bookkeeping
//! - [`coordinator`]: the per-session state machine
//! - [`events`]: ordered observer events
//! - [`registry`]: concurrent session ownership and control
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use conversation::{AgentPool, OpenAiConfig, OpenAiGenerator, SessionRegistry, Settings, StoryRequest};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::load(None)?;
//! let generator = Arc::new(OpenAiGenerator::new(OpenAiConfig::default())?);
//! let registry = SessionRegistry::from_settings(AgentPool::uniform(generator), &settings);
//!
//! let id = registry.start(StoryRequest::new("a city without shadows", 3)?).await?;
//! let mut events = registry.take_observer(id).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! let outcome = registry.wait(id).await?;
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod coordinator;
pub mod dispute;
pub mod error;
pub mod events;
pub mod registry;
pub mod request;
pub mod sanitize;
pub mod schedule;
pub mod scope;
pub mod session;
pub mod sink;
pub mod summary;
pub mod verdict;

pub use agents::{
    AgentPool, Directive, Fragment, FragmentStream, GenerationError, GenerationFailure,
    GenerationRequest, Generator, OpenAiConfig, OpenAiGenerator, Reply, Role, RoleAgent,
};
pub use config::{CoordinatorConfig, RegistryConfig, RetryPolicy, Settings};
pub use coordinator::{ConversationCoordinator, FailureReport, SessionOutcome};
pub use dispute::{DisputeResolver, DisputeSubject, Ruling};
pub use error::{CoordinatorError, CoordinatorResult, ErrorKind};
pub use events::{EventEmitter, EventKind, EventReceiver, StoryEvent};
pub use registry::{RegistryError, SessionRegistry};
pub use request::{Intensity, RequestError, StoryRequest, StyleOptions};
pub use schedule::{Checkpoint, CheckpointOutcome, CheckpointSchedule, CheckpointStatus};
pub use session::{Phase, Session, SessionId, Turn};
pub use sink::{ArtifactSink, FileArtifactSink, NullSink, SinkError};
pub use summary::SessionSummary;
pub use verdict::{parse_verdict, ParsedVerdict, Verdict};
