//! Session integration tests: full Writer/Reader/Expert sessions driven by
//! scripted generators (no LLM calls).
//!
//! Covers: coordinator ↔ schedule ↔ verdict parsing ↔ dispute resolution ↔
//! event emitter ↔ registry ↔ artifact sink running together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use conversation::{
    AgentPool, CheckpointOutcome, ConversationCoordinator, CoordinatorConfig, ErrorKind,
    EventEmitter, EventKind, FileArtifactSink, Fragment, GenerationError, GenerationRequest,
    Generator, Phase, RegistryConfig, Reply, Role, Session, SessionId, SessionOutcome,
    SessionRegistry, StoryEvent, StoryRequest,
};

type Script = dyn Fn(&GenerationRequest) -> Result<Reply, GenerationError> + Send + Sync;

/// Generator whose replies come from a closure over the request.
struct ScriptedGenerator {
    script: Box<Script>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(
        script: impl Fn(&GenerationRequest) -> Result<Reply, GenerationError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_by(&self, role: Role) -> usize {
        self.calls().iter().filter(|r| r.role == role).count()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Reply, GenerationError> {
        self.calls.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        (self.script)(&request)
    }
}

/// Writer prose wrapped in story markers.
fn story(word: &str, words: usize) -> Reply {
    Reply::Complete(format!(
        "Here is the next part.\n---BEGIN STORY---\n{}\n---END STORY---\n[@Reader]",
        vec![word; words].join(" ")
    ))
}

fn approve() -> Reply {
    Reply::Complete("Reads well.\nVERDICT: APPROVE".into())
}

fn reject() -> Reply {
    Reply::Complete("The middle sags.\nVERDICT: REQUEST_CHANGES".into())
}

fn asks(request: &GenerationRequest, prefix: &str) -> bool {
    request.directive.starts_with(prefix)
}

/// Writer writes 25 words per turn; everyone else approves.
fn cooperative(request: &GenerationRequest) -> Result<Reply, GenerationError> {
    Ok(match request.role {
        Role::Writer => story("lantern", 25),
        Role::Reader | Role::Expert => approve(),
    })
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        words_per_unit: 20,
        ..Default::default()
    }
}

async fn run_session(
    generator: Arc<ScriptedGenerator>,
    request: StoryRequest,
) -> (SessionOutcome, Vec<StoryEvent>) {
    let session = Session::new(SessionId::new(), request);
    let (emitter, mut rx) = EventEmitter::channel(session.id);
    let coordinator = ConversationCoordinator::new(
        session,
        AgentPool::uniform(generator),
        config(),
        emitter,
        CancellationToken::new(),
    );
    let outcome = coordinator.run().await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

fn transitions(outcome: &SessionOutcome) -> Vec<(Phase, Phase)> {
    outcome
        .session
        .transitions()
        .iter()
        .map(|t| (t.from, t.to))
        .collect()
}

fn assert_single_terminal_last(events: &[StoryEvent]) {
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());
}

fn assert_gapless(events: &[StoryEvent], outcome: &SessionOutcome) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1, "event seq gap at {i}");
    }
    for (i, turn) in outcome.session.turns().iter().enumerate() {
        assert_eq!(turn.seq, i as u64 + 1, "turn seq gap at {i}");
    }
}

// ── Single-unit story (happy path) ─────────────────────────────────

#[tokio::test]
async fn test_single_unit_story_runs_straight_through() {
    let generator = ScriptedGenerator::new(cooperative);
    let (outcome, events) =
        run_session(generator, StoryRequest::new("a door that opens inward", 1).unwrap()).await;

    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    assert_eq!(outcome.session.checkpoints().len(), 1);
    assert_eq!(
        transitions(&outcome),
        vec![
            (Phase::Outlining, Phase::OutlineReview),
            (Phase::OutlineReview, Phase::Drafting),
            (Phase::Drafting, Phase::CheckpointReview),
            (Phase::CheckpointReview, Phase::Finalizing),
            (Phase::Finalizing, Phase::Finalized),
        ]
    );

    let artifact = outcome.artifact().unwrap();
    assert!(!artifact.is_empty());
    assert!(!artifact.contains("---BEGIN STORY---"));
    assert!(!artifact.contains("[@Reader]"));

    assert_single_terminal_last(&events);
    assert_gapless(&events, &outcome);
    let last = events.last().unwrap();
    assert_eq!(last.event_type(), "completed");
    assert_eq!(last.kind.artifact(), Some(artifact));

    let reached: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::CheckpointReached { index, total, .. } => Some((*index, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(reached, vec![(1, 1)]);
}

#[tokio::test]
async fn test_every_turn_is_announced_then_completed() {
    let generator = ScriptedGenerator::new(cooperative);
    let (outcome, events) =
        run_session(generator, StoryRequest::new("tidewater", 2).unwrap()).await;

    let completes: Vec<u64> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::AgentTurnComplete { turn_seq, .. } => Some(*turn_seq),
            _ => None,
        })
        .collect();
    let expected: Vec<u64> = (1..=outcome.session.turns().len() as u64).collect();
    assert_eq!(completes, expected);

    // started → fragment(s) → complete for each turn, never interleaved.
    let mut open: Option<Role> = None;
    for event in &events {
        match &event.kind {
            EventKind::AgentTurnStarted { speaker, .. } => {
                assert!(open.is_none());
                open = Some(*speaker);
            }
            EventKind::AgentTurnFragment { speaker, .. } => assert_eq!(open, Some(*speaker)),
            EventKind::AgentTurnComplete { speaker, .. } => {
                assert_eq!(open.take(), Some(*speaker));
            }
            _ => assert!(open.is_none(), "{} inside a turn", event.event_type()),
        }
    }
}

// ── Outline review ceiling ─────────────────────────────────────────

#[tokio::test]
async fn test_outline_rejected_twice_routes_to_dispute() {
    let generator = ScriptedGenerator::new(|r| {
        Ok(match r.role {
            Role::Writer => story("glacier", 25),
            Role::Reader if asks(r, "Review this outline") => reject(),
            Role::Reader => approve(),
            Role::Expert => Reply::Complete("RULING: ACCEPT\nVERDICT: APPROVE".into()),
        })
    });
    let (outcome, events) =
        run_session(generator.clone(), StoryRequest::new("a frozen choir", 1).unwrap()).await;

    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    assert_eq!(
        &transitions(&outcome)[..5],
        &[
            (Phase::Outlining, Phase::OutlineReview),
            (Phase::OutlineReview, Phase::Outlining),
            (Phase::Outlining, Phase::OutlineReview),
            (Phase::OutlineReview, Phase::Dispute),
            (Phase::Dispute, Phase::Drafting),
        ]
    );
    let outline_reviews = generator
        .calls()
        .iter()
        .filter(|r| asks(r, "Review this outline"))
        .count();
    assert_eq!(outline_reviews, 2);
    assert_eq!(outcome.session.diagnostics.forced_disputes, 1);
    assert!(outcome.session.outline().is_some());

    assert!(events.iter().any(|e| e.event_type() == "dispute-opened"));
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::DisputeResolved { ruling, .. } if ruling.label() == "accept_as_is"
    )));
}

// ── Checkpoint disputes ────────────────────────────────────────────

#[tokio::test]
async fn test_checkpoint_disputes_never_exceed_ceiling() {
    let generator = ScriptedGenerator::new(|r| {
        Ok(match r.role {
            Role::Writer => story("ember", 25),
            Role::Reader if asks(r, "Review this outline") => approve(),
            Role::Reader => reject(),
            Role::Expert if asks(r, "The Writer and Reader cannot agree") => {
                Reply::Complete("RULING: REVISE cut the second flashback".into())
            }
            Role::Expert => approve(),
        })
    });
    let (outcome, _events) =
        run_session(generator.clone(), StoryRequest::new("a burnt library", 3).unwrap()).await;

    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    let session = &outcome.session;
    assert_eq!(session.checkpoints().len(), 2);
    assert_eq!(session.current_checkpoint(), 2);
    assert!(session
        .checkpoints()
        .iter()
        .all(|c| c.outcome == CheckpointOutcome::Overridden));

    // Two Reader rounds per checkpoint, then the Expert rules.
    let segment_reviews = session
        .turns()
        .iter()
        .filter(|t| t.speaker == Role::Reader && t.phase == Phase::CheckpointReview)
        .count();
    assert_eq!(segment_reviews, 4);
    assert_eq!(session.diagnostics.forced_disputes, 2);

    let applied = generator
        .calls()
        .iter()
        .filter(|r| asks(r, "The Expert has ruled"))
        .count();
    assert_eq!(applied, 2);
}

#[tokio::test]
async fn test_unparseable_ruling_truncates_to_agreed_text() {
    let generator = ScriptedGenerator::new(|r| {
        Ok(match r.role {
            Role::Writer if asks(r, "Continue the draft") => story("quartz", 25),
            Role::Writer => story("outline", 10),
            Role::Reader if asks(r, "Review this outline") => approve(),
            Role::Reader => reject(),
            Role::Expert if asks(r, "The Writer and Reader cannot agree") => {
                Reply::Complete("Both have a point, honestly.".into())
            }
            Role::Expert => approve(),
        })
    });
    let (outcome, events) =
        run_session(generator, StoryRequest::new("a mine collapse", 1).unwrap()).await;

    // The only checkpoint is overridden with its segment dropped, so the
    // Writer has to draft the whole story again before finalizing.
    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    assert_eq!(
        outcome.session.checkpoints()[0].outcome,
        CheckpointOutcome::Overridden
    );
    assert!(outcome.session.diagnostics.unparseable_verdicts >= 1);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::DisputeResolved { ruling, .. } if ruling.label() == "escalate_and_truncate"
    )));
    assert_eq!(outcome.session.current_checkpoint(), 1);
}

// ── Checkpoint schedule properties across lengths ──────────────────

#[tokio::test]
async fn test_finalized_sessions_pass_every_checkpoint_in_order() {
    for target in 1..=10 {
        let generator = ScriptedGenerator::new(cooperative);
        let (outcome, events) =
            run_session(generator, StoryRequest::new("a long corridor", target).unwrap()).await;

        assert!(outcome.is_finalized(), "target {target}: {:?}", outcome.failure);
        let total = outcome.session.checkpoints().len();
        assert!(total >= 1 && total <= target as usize);
        assert_eq!(outcome.session.current_checkpoint(), total, "target {target}");

        let indices: Vec<usize> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::CheckpointReached { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, (1..=total).collect::<Vec<_>>(), "target {target}");
        assert_gapless(&events, &outcome);
        assert_single_terminal_last(&events);
    }
}

// ── Generation failures ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_single_failure_is_retried_in_place() {
    let failed_once = AtomicBool::new(false);
    let generator = ScriptedGenerator::new(move |r| {
        if r.role == Role::Reader && !failed_once.swap(true, Ordering::SeqCst) {
            return Err(GenerationError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        cooperative(r)
    });
    let (outcome, events) =
        run_session(generator.clone(), StoryRequest::new("a paper boat", 1).unwrap()).await;

    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    assert_eq!(outcome.session.diagnostics.retries, 1);
    assert_eq!(
        transitions(&outcome)[..2],
        [
            (Phase::Outlining, Phase::OutlineReview),
            (Phase::OutlineReview, Phase::Drafting),
        ]
    );
    // One failed call plus one successful retry, but only one Reader turn logged there.
    let review_turns = outcome
        .session
        .turns()
        .iter()
        .filter(|t| t.phase == Phase::OutlineReview)
        .count();
    assert_eq!(review_turns, 1);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        EventKind::AgentTurnStarted { speaker: Role::Reader, attempt: 2, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failure_fails_session() {
    let generator = ScriptedGenerator::new(|r| {
        if asks(r, "Continue the draft") {
            return Err(GenerationError::Request("connection refused".into()));
        }
        cooperative(r)
    });
    let (outcome, events) =
        run_session(generator.clone(), StoryRequest::new("a radio tower", 2).unwrap()).await;

    assert_eq!(outcome.phase(), Phase::Failed);
    assert!(outcome.artifact().is_none());
    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::GenerationFailure);
    assert_eq!(failure.phase, Phase::Drafting);

    let drafting_calls = generator
        .calls()
        .iter()
        .filter(|r| asks(r, "Continue the draft"))
        .count();
    assert_eq!(drafting_calls, 3);

    assert_single_terminal_last(&events);
    match &events.last().unwrap().kind {
        EventKind::Failed {
            phase, error_kind, ..
        } => {
            assert_eq!(*phase, Phase::Drafting);
            assert_eq!(*error_kind, ErrorKind::GenerationFailure);
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert!(!events.iter().any(|e| e.event_type() == "completed"));
}

// ── Cancellation ───────────────────────────────────────────────────

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_cancel_mid_turn_emits_one_failed_event() {
    let entered = Arc::new(Notify::new());
    let released = Arc::new(AtomicBool::new(false));
    let generator = {
        let entered = entered.clone();
        let released = released.clone();
        ScriptedGenerator::new(move |r| {
            if asks(r, "Continue the draft") {
                entered.notify_one();
                let guard = DropFlag(released.clone());
                let hung = stream::unfold(guard, |guard| async move {
                    futures::future::pending::<()>().await;
                    Some((Ok::<_, GenerationError>(Fragment::End), guard))
                });
                return Ok(Reply::Stream(Box::pin(hung)));
            }
            cooperative(r)
        })
    };
    let registry = SessionRegistry::new(
        AgentPool::uniform(generator.clone()),
        config(),
        RegistryConfig::default(),
    );

    let id = registry
        .start(StoryRequest::new("a night ferry", 3).unwrap())
        .await
        .unwrap();
    let mut rx = registry.take_observer(id).await.unwrap();

    entered.notified().await;
    assert_eq!(registry.get_status(id).await.unwrap(), Phase::Drafting);
    registry.cancel(id).await.unwrap();

    let outcome = registry.wait(id).await.unwrap();
    assert_eq!(outcome.phase(), Phase::Failed);
    assert!(outcome.artifact().is_none());
    assert!(released.load(Ordering::SeqCst), "in-flight stream not dropped");
    assert_eq!(registry.get_status(id).await.unwrap(), Phase::Failed);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_single_terminal_last(&events);
    match &events.last().unwrap().kind {
        EventKind::Failed {
            phase, error_kind, ..
        } => {
            assert_eq!(*phase, Phase::Drafting);
            assert_eq!(*error_kind, ErrorKind::CancellationRequested);
        }
        other => panic!("expected failed, got {other:?}"),
    }
    // No Writer turn was appended for the abandoned draft call.
    assert!(outcome
        .session
        .turns()
        .iter()
        .all(|t| t.phase != Phase::Drafting));
}

#[tokio::test]
async fn test_cancel_before_first_turn() {
    let generator = ScriptedGenerator::new(cooperative);
    let session = Session::new(SessionId::new(), StoryRequest::new("static", 1).unwrap());
    let (emitter, mut rx) = EventEmitter::channel(session.id);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = ConversationCoordinator::new(
        session,
        AgentPool::uniform(generator.clone()),
        config(),
        emitter,
        cancel,
    )
    .run()
    .await;

    assert_eq!(outcome.phase(), Phase::Failed);
    assert_eq!(generator.calls().len(), 0);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type(), "status");
    assert_eq!(events[1].event_type(), "failed");
}

/// Outline rejected into a dispute, then cooperative to the end, so a
/// one-unit story passes through every non-terminal phase.
fn through_every_phase(r: &GenerationRequest) -> Result<Reply, GenerationError> {
    Ok(match r.role {
        Role::Writer => story("tide", 25),
        Role::Reader if asks(r, "Review this outline") => reject(),
        Role::Reader => approve(),
        Role::Expert if asks(r, "The Writer and Reader cannot agree") => {
            Reply::Complete("RULING: ACCEPT".into())
        }
        Role::Expert => approve(),
    })
}

async fn run_with_token(
    generator: Arc<ScriptedGenerator>,
    cancel: CancellationToken,
) -> (SessionOutcome, Vec<StoryEvent>) {
    let session = Session::new(SessionId::new(), StoryRequest::new("a tidal island", 1).unwrap());
    let (emitter, mut rx) = EventEmitter::channel(session.id);
    let outcome = ConversationCoordinator::new(
        session,
        AgentPool::uniform(generator),
        config(),
        emitter,
        cancel,
    )
    .run()
    .await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

#[tokio::test]
async fn test_uncancelled_run_visits_every_phase() {
    let generator = ScriptedGenerator::new(through_every_phase);
    let (outcome, _events) = run_with_token(generator, CancellationToken::new()).await;

    assert!(outcome.is_finalized(), "failure: {:?}", outcome.failure);
    let visited: Vec<Phase> = outcome.session.transitions().iter().map(|t| t.from).collect();
    for phase in [
        Phase::Outlining,
        Phase::OutlineReview,
        Phase::Dispute,
        Phase::Drafting,
        Phase::CheckpointReview,
        Phase::Finalizing,
    ] {
        assert!(visited.contains(&phase), "{phase} never visited");
    }
}

#[tokio::test]
async fn test_cancel_in_each_phase_emits_one_failed_event() {
    let cases = [
        (Phase::Outlining, "Produce a concise outline"),
        (Phase::OutlineReview, "Review this outline"),
        (Phase::Dispute, "The Writer and Reader cannot agree"),
        (Phase::Drafting, "Continue the draft"),
        (Phase::CheckpointReview, "The draft has reached checkpoint"),
        (Phase::Finalizing, "The draft is complete"),
    ];

    for (phase, prefix) in cases {
        let cancel = CancellationToken::new();
        let generator = {
            let cancel = cancel.clone();
            ScriptedGenerator::new(move |r| {
                if asks(r, prefix) {
                    cancel.cancel();
                    return Ok(Reply::Stream(Box::pin(
                        stream::pending::<Result<Fragment, GenerationError>>(),
                    )));
                }
                through_every_phase(r)
            })
        };
        let (outcome, events) = run_with_token(generator, cancel).await;

        assert_eq!(outcome.phase(), Phase::Failed, "cancelled in {phase}");
        assert!(outcome.artifact().is_none(), "cancelled in {phase}");
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::CancellationRequested, "cancelled in {phase}");
        assert_eq!(failure.phase, phase);

        assert_single_terminal_last(&events);
        assert_gapless(&events, &outcome);
        match &events.last().unwrap().kind {
            EventKind::Failed {
                phase: failed_in,
                error_kind,
                ..
            } => {
                assert_eq!(*failed_in, phase);
                assert_eq!(*error_kind, ErrorKind::CancellationRequested);
            }
            other => panic!("cancelled in {phase}: expected failed, got {other:?}"),
        }
        assert!(!events.iter().any(|e| e.event_type() == "completed"));
        // The cancelled call was the phase's first; nothing was appended for it.
        assert!(outcome.session.turns().iter().all(|t| t.phase != phase));
    }
}

#[tokio::test]
async fn test_cancel_after_closing_review_returns_still_finalizes() {
    // The closing review comes back in full; cancellation lands after the
    // last turn, so the session completes with its artifact.
    let cancel = CancellationToken::new();
    let generator = {
        let cancel = cancel.clone();
        ScriptedGenerator::new(move |r| {
            if asks(r, "The draft is complete") {
                cancel.cancel();
            }
            through_every_phase(r)
        })
    };
    let (outcome, events) = run_with_token(generator, cancel.clone()).await;

    assert!(cancel.is_cancelled());
    assert_eq!(outcome.phase(), Phase::Finalized);
    assert!(outcome.failure.is_none());
    assert!(outcome.artifact().is_some());
    assert_single_terminal_last(&events);
    assert_eq!(events.last().unwrap().event_type(), "completed");
    assert!(!events.iter().any(|e| e.event_type() == "failed"));
}

// ── Concurrent sessions ────────────────────────────────────────────

fn theme_of(request: &GenerationRequest) -> String {
    request
        .persona
        .lines()
        .find_map(|l| l.strip_prefix("Theme: "))
        .unwrap_or_default()
        .to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_are_isolated() {
    // The Writer echoes the session's own theme word, so any cross-talk
    // between sessions would show up in another session's artifact.
    let generator = ScriptedGenerator::new(|r| {
        Ok(match r.role {
            Role::Writer => story(&theme_of(r), 25),
            _ => approve(),
        })
    });
    let registry = Arc::new(SessionRegistry::new(
        AgentPool::uniform(generator.clone()),
        config(),
        RegistryConfig { max_sessions: 8 },
    ));

    let themes = ["amber", "cobalt", "crimson", "jade", "ochre"];
    let mut ids = Vec::new();
    for (i, theme) in themes.iter().enumerate() {
        let request = StoryRequest::new(*theme, i as u32 + 1).unwrap();
        ids.push(registry.start(request).await.unwrap());
    }

    let mut handles = Vec::new();
    for id in ids.clone() {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.wait(id).await }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_finalized(), "{}: {:?}", themes[i], outcome.failure);
        assert_eq!(outcome.session.request.theme(), themes[i]);
        let artifact = outcome.artifact().unwrap();
        assert!(artifact.contains(themes[i]));
        for other in themes.iter().filter(|t| **t != themes[i]) {
            assert!(!artifact.contains(other), "{} leaked into {}", other, themes[i]);
        }
        assert_eq!(
            outcome.session.current_checkpoint(),
            outcome.session.checkpoints().len()
        );
    }

    assert_eq!(registry.active_count().await, 0);
    assert_eq!(registry.evict_finished().await.len(), themes.len());
    assert!(generator.calls_by(Role::Expert) >= themes.len());
}

// ── Artifact sink ──────────────────────────────────────────────────

#[tokio::test]
async fn test_finalized_session_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileArtifactSink::new(dir.path()));
    let registry = SessionRegistry::new(
        AgentPool::uniform(ScriptedGenerator::new(cooperative)),
        config(),
        RegistryConfig::default(),
    )
    .with_sink(sink.clone());

    let id = registry
        .start(StoryRequest::new("a snow globe", 2).unwrap())
        .await
        .unwrap();
    let outcome = registry.wait(id).await.unwrap();
    assert!(outcome.is_finalized());

    let session_dir = sink.session_dir(id);
    let story = std::fs::read_to_string(session_dir.join("story.md")).unwrap();
    assert_eq!(story.trim_end(), outcome.artifact().unwrap().trim_end());

    let transcript = std::fs::read_to_string(session_dir.join("transcript.jsonl")).unwrap();
    assert_eq!(transcript.lines().count(), outcome.session.turns().len());
}

#[tokio::test(start_paused = true)]
async fn test_failed_session_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileArtifactSink::new(dir.path()));
    let generator = ScriptedGenerator::new(|_| Err(GenerationError::Timeout(1)));
    let registry = SessionRegistry::new(
        AgentPool::uniform(generator),
        config(),
        RegistryConfig::default(),
    )
    .with_sink(sink.clone());

    let id = registry
        .start(StoryRequest::new("an empty stage", 1).unwrap())
        .await
        .unwrap();
    let outcome = registry.wait(id).await.unwrap();
    assert_eq!(outcome.phase(), Phase::Failed);
    assert!(!sink.session_dir(id).exists());
}
