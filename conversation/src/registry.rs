//! Session registry: one isolated coordinator per concurrent request.
//!
//! Each session runs as its own tokio task that exclusively owns its
//! [`Session`](crate::session::Session). The registry only keeps the control
//! handles: a phase watch, a cancellation token, the observer receiver until
//! it is claimed, and the task's join handle. The [`AgentPool`] is the one
//! thing shared across sessions.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::agents::AgentPool;
use crate::config::{CoordinatorConfig, RegistryConfig, Settings};
use crate::coordinator::{ConversationCoordinator, SessionOutcome};
use crate::events::{EventEmitter, EventReceiver};
use crate::request::{RequestError, StoryRequest};
use crate::session::{Phase, Session, SessionId};
use crate::sink::{ArtifactSink, FileArtifactSink, NullSink};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("registry at capacity ({max} live sessions)")]
    AtCapacity { max: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("observer for session {0} already taken")]
    ObserverTaken(SessionId),

    #[error("outcome for session {0} already taken")]
    OutcomeTaken(SessionId),

    #[error("session task {id} aborted: {message}")]
    Join { id: SessionId, message: String },
}

struct SessionHandle {
    status: watch::Receiver<Phase>,
    cancel: CancellationToken,
    events: Option<EventReceiver>,
    task: Option<JoinHandle<SessionOutcome>>,
}

impl SessionHandle {
    fn phase(&self) -> Phase {
        *self.status.borrow()
    }

    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

/// Owns every live session's control handles.
pub struct SessionRegistry {
    agents: AgentPool,
    config: CoordinatorConfig,
    limits: RegistryConfig,
    sink: Arc<dyn ArtifactSink>,
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(agents: AgentPool, config: CoordinatorConfig, limits: RegistryConfig) -> Self {
        Self {
            agents,
            config,
            limits,
            sink: Arc::new(NullSink),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry writing artifacts under `settings.output_dir`.
    pub fn from_settings(agents: AgentPool, settings: &Settings) -> Self {
        Self::new(agents, settings.coordinator.clone(), settings.registry.clone())
            .with_sink(Arc::new(FileArtifactSink::new(&settings.output_dir)))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validate the request and spawn its coordinator.
    pub async fn start(&self, request: StoryRequest) -> Result<SessionId, RegistryError> {
        request.validate()?;

        let mut sessions = self.sessions.write().await;
        let live = sessions.values().filter(|h| !h.phase().is_terminal()).count();
        if live >= self.limits.max_sessions {
            return Err(RegistryError::AtCapacity {
                max: self.limits.max_sessions,
            });
        }

        let id = SessionId::new();
        let session = Session::new(id, request);
        let (emitter, events) = EventEmitter::channel(id);
        let cancel = CancellationToken::new();
        let coordinator = ConversationCoordinator::new(
            session,
            self.agents.clone(),
            self.config.clone(),
            emitter,
            cancel.clone(),
        )
        .with_sink(self.sink.clone());
        let status = coordinator.subscribe_status();

        let span = tracing::info_span!("session", session_id = %id);
        let task = tokio::spawn(coordinator.run().instrument(span));

        sessions.insert(
            id,
            SessionHandle {
                status,
                cancel,
                events: Some(events),
                task: Some(task),
            },
        );
        info!(session_id = %id, live = live + 1, "session registered");
        Ok(id)
    }

    /// Claim the session's event stream. Only one observer per session.
    pub async fn take_observer(&self, id: SessionId) -> Result<EventReceiver, RegistryError> {
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        handle.events.take().ok_or(RegistryError::ObserverTaken(id))
    }

    /// Request cooperative cancellation. Idempotent.
    pub async fn cancel(&self, id: SessionId) -> Result<(), RegistryError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(RegistryError::UnknownSession(id))?;
        if !handle.cancel.is_cancelled() {
            info!(session_id = %id, phase = %handle.phase(), "cancellation requested");
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Current phase of a session.
    pub async fn get_status(&self, id: SessionId) -> Result<Phase, RegistryError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(SessionHandle::phase)
            .ok_or(RegistryError::UnknownSession(id))
    }

    /// Await a session's outcome. The outcome can be taken once.
    pub async fn wait(&self, id: SessionId) -> Result<SessionOutcome, RegistryError> {
        let task = {
            let mut sessions = self.sessions.write().await;
            let handle = sessions
                .get_mut(&id)
                .ok_or(RegistryError::UnknownSession(id))?;
            handle.task.take().ok_or(RegistryError::OutcomeTaken(id))?
        };
        task.await.map_err(|e| RegistryError::Join {
            id,
            message: e.to_string(),
        })
    }

    /// Drop sessions whose task has ended. Returns the evicted ids.
    pub async fn evict_finished(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let finished: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, h)| h.phase().is_terminal() && h.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            sessions.remove(id);
        }
        if !finished.is_empty() {
            info!(evicted = finished.len(), remaining = sessions.len(), "evicted finished sessions");
        }
        finished
    }

    /// Sessions not yet in a terminal phase.
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|h| !h.phase().is_terminal()).count()
    }

    /// All tracked sessions, live or finished.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
