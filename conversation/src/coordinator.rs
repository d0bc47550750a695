//! Conversation coordinator: the per-session state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! Outlining → OutlineReview ─┬→ Drafting ⇄ CheckpointReview
//!     ↑            │         │      │             │
//!     └────────────┘         │      │             ↓
//!                  └→ Dispute ──────┴──────── Dispute
//!                                   ↓
//!                              Finalizing → Finalized
//!
//! any live phase → Failed
//! ```
//!
//! Each loop iteration runs the handler for the current phase. A handler
//! takes one or more turns and returns the next [`Step`]; the coordinator
//! applies the transition, then publishes the new phase and emits a `status`
//! event. Turns are strictly sequential, and the only suspension points are
//! generation calls and retry backoff, both of which observe cancellation.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::{
    AgentPool, Directive, Fragment, GenerationError, GenerationFailure, Role, RoleAgent,
    SessionView,
};
use crate::config::CoordinatorConfig;
use crate::dispute::{DisputeResolver, DisputeSubject, Ruling};
use crate::error::{CoordinatorError, CoordinatorResult, ErrorKind};
use crate::events::{EventEmitter, EventKind};
use crate::sanitize::{sanitize_fragment, sanitize_text};
use crate::schedule::{pacing_note, CheckpointOutcome};
use crate::scope::evaluate_outline_scope;
use crate::session::{extract_story_segment, Phase, Session, SessionId};
use crate::sink::{ArtifactSink, NullSink};
use crate::summary::SessionSummary;
use crate::verdict::{parse_verdict, ParsedVerdict};

/// Next transition requested by a phase handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub to: Phase,
    pub reason: String,
}

impl Step {
    fn to(to: Phase, reason: impl Into<String>) -> Self {
        Self {
            to,
            reason: reason.into(),
        }
    }
}

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    /// Last phase before `Failed`.
    pub phase: Phase,
    pub message: String,
}

/// Final state of a session, returned when its coordinator stops.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: Session,
    pub summary: SessionSummary,
    pub failure: Option<FailureReport>,
}

impl SessionOutcome {
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_finalized(&self) -> bool {
        self.session.phase() == Phase::Finalized
    }

    pub fn artifact(&self) -> Option<&str> {
        self.session.final_artifact()
    }
}

/// Outcome of one generation attempt.
enum AttemptError {
    Cancelled,
    Failed(GenerationFailure),
}

/// Drives one session from `Outlining` to a terminal phase.
pub struct ConversationCoordinator {
    session: Session,
    agents: AgentPool,
    config: CoordinatorConfig,
    resolver: DisputeResolver,
    emitter: EventEmitter,
    status: watch::Sender<Phase>,
    cancel: CancellationToken,
    sink: Arc<dyn ArtifactSink>,

    /// Latest Writer outline, approved or not.
    candidate_outline: String,
    /// Reader notes for the next outline attempt.
    outline_notes: Option<String>,
    /// Scope assessment for the Reader's next outline review.
    scope_note: Option<String>,
    /// Checkpoints covered by the segment under review.
    review_span: usize,
    dispute: Option<DisputeSubject>,
    artifact: Option<String>,
}

impl ConversationCoordinator {
    pub fn new(
        session: Session,
        agents: AgentPool,
        config: CoordinatorConfig,
        emitter: EventEmitter,
        cancel: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(session.phase());
        Self {
            session,
            agents,
            config,
            resolver: DisputeResolver,
            emitter,
            status,
            cancel,
            sink: Arc::new(NullSink),
            candidate_outline: String::new(),
            outline_notes: None,
            scope_note: None,
            review_span: 0,
            dispute: None,
            artifact: None,
        }
    }

    /// Persist finalized artifacts through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Live view of the current phase.
    pub fn subscribe_status(&self) -> watch::Receiver<Phase> {
        self.status.subscribe()
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    /// Run the session to completion or failure.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            session_id = %self.session.id,
            theme = %self.session.request.theme(),
            target_length = self.session.request.target_length(),
            checkpoints = self.session.checkpoints().len(),
            "session starting"
        );
        self.emitter.emit(EventKind::Status {
            phase: self.session.phase(),
            message: "session started".to_string(),
        });

        let failure = match self.drive().await {
            Ok(()) => match self.complete().await {
                Ok(()) => None,
                Err(e) => Some(self.fail(e)),
            },
            Err(e) => Some(self.fail(e)),
        };

        let summary = SessionSummary::from_session(&self.session, self.config.words_per_unit);
        info!(
            session_id = %self.session.id,
            phase = %self.session.phase(),
            turns = summary.total_turns,
            words = summary.words,
            "session ended"
        );
        SessionOutcome {
            session: self.session,
            summary,
            failure,
        }
    }

    async fn drive(&mut self) -> CoordinatorResult<()> {
        loop {
            let phase = self.session.phase();
            // A session that reached Finalized completes even if cancelled since.
            if phase == Phase::Finalized {
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(CoordinatorError::Cancelled);
            }
            let step = match phase {
                Phase::Outlining => Some(self.outline().await?),
                Phase::OutlineReview => Some(self.review_outline().await?),
                Phase::Drafting => Some(self.draft_segment().await?),
                Phase::CheckpointReview => self.review_checkpoint().await?,
                Phase::Dispute => Some(self.resolve_dispute().await?),
                Phase::Finalizing => Some(self.finalize().await?),
                Phase::Finalized => return Ok(()),
                Phase::Failed => {
                    return Err(CoordinatorError::violation(phase, "driven after failure"))
                }
            };
            if let Some(step) = step {
                self.advance(step)?;
            }
        }
    }

    /// Apply a transition, then publish it.
    fn advance(&mut self, step: Step) -> CoordinatorResult<()> {
        let from = self.session.phase();
        self.session.transition(step.to, &step.reason)?;
        info!(
            session_id = %self.session.id,
            from = %from,
            to = %step.to,
            reason = %step.reason,
            "phase transition"
        );
        self.status.send_replace(step.to);
        self.emitter.emit(EventKind::Status {
            phase: step.to,
            message: step.reason,
        });
        Ok(())
    }

    /// Move to `Failed` and emit the single terminal event.
    fn fail(&mut self, err: CoordinatorError) -> FailureReport {
        let phase = self.session.phase();
        let kind = err.kind();
        let message = err.to_string();
        match kind {
            ErrorKind::ScheduleViolation => {
                error!(session_id = %self.session.id, phase = %phase, error = %message, "schedule violation")
            }
            ErrorKind::CancellationRequested => {
                info!(session_id = %self.session.id, phase = %phase, "session cancelled")
            }
            _ => warn!(session_id = %self.session.id, phase = %phase, kind = %kind, error = %message, "session failed"),
        }
        if !phase.is_terminal() {
            if let Err(e) = self.session.transition(Phase::Failed, &message) {
                error!(session_id = %self.session.id, error = %e, "could not record failure transition");
            }
        }
        self.status.send_replace(self.session.phase());
        self.emitter.emit(EventKind::Failed {
            phase,
            error_kind: kind,
            message: message.clone(),
        });
        FailureReport {
            kind,
            phase,
            message,
        }
    }

    /// Set the artifact, announce it, and hand it to the sink.
    async fn complete(&mut self) -> CoordinatorResult<()> {
        let artifact = self
            .artifact
            .take()
            .ok_or_else(|| CoordinatorError::violation(Phase::Finalized, "no artifact prepared"))?;
        self.session.set_artifact(artifact.clone())?;
        self.emitter.emit(EventKind::Completed {
            phase: Phase::Finalized,
            artifact: artifact.clone(),
        });
        if let Err(e) = self
            .sink
            .persist(self.session.id, &artifact, self.session.turns().as_slice())
            .await
        {
            warn!(session_id = %self.session.id, error = %e, "artifact sink failed");
        }
        Ok(())
    }

    // ── Turns ───────────────────────────────────────────────────────────

    /// Take one turn with retry, returning the appended content.
    async fn take_turn(&mut self, directive: Directive) -> CoordinatorResult<String> {
        let role = directive.role();
        let label = directive.label();
        let phase = self.session.phase();
        let max_attempts = self.config.retry.max_attempts.max(1);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.emitter.emit(EventKind::AgentTurnStarted {
                speaker: role,
                phase,
                directive: label.clone(),
                attempt,
            });
            debug!(session_id = %self.session.id, role = %role, directive = %label, attempt, "turn started");

            match self.attempt(role, &directive).await {
                Ok(text) => {
                    let content = sanitize_text(&text);
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let turn_seq = self
                        .session
                        .append_turn(role, content.clone(), elapsed_ms)?
                        .seq;
                    self.emitter.emit(EventKind::AgentTurnComplete {
                        speaker: role,
                        phase,
                        turn_seq,
                        content: content.clone(),
                    });
                    return Ok(content);
                }
                Err(AttemptError::Cancelled) => return Err(CoordinatorError::Cancelled),
                Err(AttemptError::Failed(failure)) => {
                    if matches!(failure.source, GenerationError::Timeout(_)) {
                        self.session.diagnostics.timeouts += 1;
                    }
                    if attempt >= max_attempts {
                        return Err(CoordinatorError::exhausted(&failure, attempt));
                    }
                    self.session.diagnostics.retries += 1;
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        session_id = %self.session.id,
                        role = %role,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "turn failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One generation attempt under the turn timeout, streaming fragments out.
    async fn attempt(&mut self, role: Role, directive: &Directive) -> Result<String, AttemptError> {
        let timeout = self.config.turn_timeout();
        let phase = self.session.phase();
        let cancel = self.cancel.clone();
        let agent = self.agents.get(role);
        let view = self.session.view();
        let work = collect_reply(agent, view, directive, phase, &mut self.emitter);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            res = tokio::time::timeout(timeout, work) => match res {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(failure)) => Err(AttemptError::Failed(failure)),
                Err(_) => Err(AttemptError::Failed(GenerationFailure {
                    role,
                    directive: directive.label(),
                    source: GenerationError::Timeout(timeout.as_secs()),
                })),
            },
        }
    }

    /// Parse a review, counting and logging the tie-break.
    fn read_verdict(&mut self, reply: &str, role: Role) -> ParsedVerdict {
        let verdict = parse_verdict(reply);
        if !verdict.parsed {
            self.session.diagnostics.unparseable_verdicts += 1;
            warn!(
                session_id = %self.session.id,
                role = %role,
                kind = %ErrorKind::UnparseableVerdict,
                "no clear verdict; treating as request-changes"
            );
        }
        verdict
    }

    // ── Phase handlers ──────────────────────────────────────────────────

    async fn outline(&mut self) -> CoordinatorResult<Step> {
        let directive = Directive::ProduceOutline {
            revision_notes: self.outline_notes.take(),
        };
        let reply = self.take_turn(directive).await?;
        self.candidate_outline = extract_story_segment(&reply);

        let assessment = evaluate_outline_scope(
            &self.candidate_outline,
            self.session.request.target_length(),
        );
        if assessment.needs_attention() {
            info!(session_id = %self.session.id, score = assessment.score, max = assessment.max_score, "outline scope flagged");
            self.emitter.emit(EventKind::Status {
                phase: self.session.phase(),
                message: assessment.message.clone(),
            });
            self.scope_note = Some(assessment.message);
        }
        Ok(Step::to(Phase::OutlineReview, "outline drafted"))
    }

    async fn review_outline(&mut self) -> CoordinatorResult<Step> {
        let directive = Directive::ReviewOutline {
            outline: self.candidate_outline.clone(),
            scope_note: self.scope_note.take(),
        };
        let reply = self.take_turn(directive).await?;
        let verdict = self.read_verdict(&reply, Role::Reader);

        if verdict.is_approved() {
            self.session.set_outline(self.candidate_outline.clone())?;
            self.session.dispute_count = 0;
            return Ok(Step::to(Phase::Drafting, "outline approved"));
        }

        self.session.dispute_count += 1;
        if self.session.dispute_count >= self.config.review_ceiling {
            self.open_dispute(DisputeSubject::Outline);
            return Ok(Step::to(
                Phase::Dispute,
                format!(
                    "outline rejected {} time(s); expert ruling required",
                    self.session.dispute_count
                ),
            ));
        }
        self.outline_notes = Some(reply);
        Ok(Step::to(Phase::Outlining, "reader requested outline changes"))
    }

    async fn draft_segment(&mut self) -> CoordinatorResult<Step> {
        let wpu = self.config.words_per_unit;
        let target_length = self.session.request.target_length();
        let next = self.session.next_checkpoint().cloned();
        let checkpoint_no = next.as_ref().map(|_| self.session.current_checkpoint() + 1);
        let goal_words = match &next {
            Some(cp) => cp.word_target(wpu),
            None => self.session.request.total_words(wpu) as usize,
        };
        let final_segment = next.is_none();

        let mut turns = 0;
        while self.session.draft.words() < goal_words && turns < self.config.max_segment_turns {
            let directive = Directive::ContinueDraft {
                checkpoint: checkpoint_no,
                target_words: goal_words,
                words_so_far: self.session.draft.words(),
                pacing: pacing_note(self.session.draft.units(wpu), target_length).to_string(),
                final_segment,
            };
            let reply = self.take_turn(directive).await?;
            self.session.draft.append(&extract_story_segment(&reply));
            turns += 1;
        }

        if next.is_none() {
            return Ok(Step::to(Phase::Finalizing, "draft reached target length"));
        }

        // A segment that hit the turn cap without the word goal still gets reviewed.
        self.review_span = 0;
        self.extend_review_span(self.session.reached_checkpoints(wpu).max(1));
        let last = self.session.current_checkpoint() + self.review_span;
        Ok(Step::to(
            Phase::CheckpointReview,
            format!(
                "checkpoint {last} of {} reached",
                self.session.checkpoints().len()
            ),
        ))
    }

    /// `None` keeps the session in review for another Reader pass.
    async fn review_checkpoint(&mut self) -> CoordinatorResult<Option<Step>> {
        let last = self.session.current_checkpoint() + self.review_span;
        let segment = self.session.draft.pending_segment().to_string();
        let reply = self
            .take_turn(Directive::ReviewSegment {
                checkpoint: last,
                segment: segment.clone(),
            })
            .await?;
        let verdict = self.read_verdict(&reply, Role::Reader);

        if verdict.is_approved() {
            self.close_checkpoints(CheckpointOutcome::Approved)?;
            return Ok(Some(self.after_checkpoint(format!("checkpoint {last} approved"))));
        }

        self.session.dispute_count += 1;
        if self.session.dispute_count >= self.config.review_ceiling {
            self.open_dispute(DisputeSubject::Checkpoint { index: last });
            return Ok(Some(Step::to(
                Phase::Dispute,
                format!(
                    "checkpoint {last} rejected {} time(s); expert ruling required",
                    self.session.dispute_count
                ),
            )));
        }

        let revised = self
            .take_turn(Directive::ReviseSegment {
                segment,
                notes: reply,
            })
            .await?;
        let revised = extract_story_segment(&revised);
        if !revised.is_empty() {
            self.session.draft.replace_pending(&revised);
        }
        Ok(None)
    }

    /// Drafting continues unless the last checkpoint closed on a complete draft.
    fn after_checkpoint(&self, reason: String) -> Step {
        if self.session.draft_complete(self.config.words_per_unit) {
            Step::to(Phase::Finalizing, format!("{reason}; draft complete"))
        } else {
            Step::to(Phase::Drafting, reason)
        }
    }

    fn open_dispute(&mut self, subject: DisputeSubject) {
        self.session.diagnostics.forced_disputes += 1;
        warn!(
            session_id = %self.session.id,
            subject = %subject,
            rounds = self.session.dispute_count,
            kind = %ErrorKind::DisputeCeilingExceeded,
            "review ceiling reached; forcing expert ruling"
        );
        self.dispute = Some(subject);
    }

    /// Grow the review span to `reached` checkpoints, announcing each new one.
    fn extend_review_span(&mut self, reached: usize) {
        let total = self.session.checkpoints().len();
        let words = self.session.draft.words();
        let current = self.session.current_checkpoint();
        while self.review_span < reached {
            self.review_span += 1;
            let index = current + self.review_span;
            info!(session_id = %self.session.id, checkpoint = index, total, words, "checkpoint reached");
            self.emitter.emit(EventKind::CheckpointReached {
                phase: self.session.phase(),
                index,
                total,
                words,
            });
        }
    }

    /// Mark every checkpoint in the current review span as passed.
    ///
    /// Revisions that pushed the draft past further checkpoints close those too,
    /// so the next drafting step always has words left to write.
    fn close_checkpoints(&mut self, outcome: CheckpointOutcome) -> CoordinatorResult<()> {
        self.extend_review_span(self.session.reached_checkpoints(self.config.words_per_unit));
        for _ in 0..self.review_span.max(1) {
            self.session.advance_checkpoint(outcome)?;
        }
        self.review_span = 0;
        self.session.draft.mark_agreed();
        self.session.dispute_count = 0;
        Ok(())
    }

    async fn resolve_dispute(&mut self) -> CoordinatorResult<Step> {
        let phase = self.session.phase();
        let subject = self
            .dispute
            .take()
            .ok_or_else(|| CoordinatorError::violation(phase, "dispute without a subject"))?;
        self.emitter.emit(EventKind::DisputeOpened {
            phase,
            subject: subject.clone(),
            review_rounds: self.session.dispute_count,
        });

        let context = self.resolver.context(&self.session, subject.clone());
        let directive = self.resolver.directive(&context);
        let reply = self.take_turn(directive).await?;
        let ruling = self.resolver.parse_ruling(&reply);
        if ruling == Ruling::EscalateAndTruncate {
            self.session.diagnostics.unparseable_verdicts += 1;
            warn!(session_id = %self.session.id, subject = %subject, "unparseable ruling; escalating");
        }
        info!(session_id = %self.session.id, subject = %subject, ruling = ruling.label(), "dispute resolved");
        self.emitter.emit(EventKind::DisputeResolved {
            phase,
            subject: subject.clone(),
            ruling: ruling.clone(),
        });

        match &subject {
            DisputeSubject::Outline => {
                let outline = match &ruling {
                    Ruling::RequireRevision(instructions) => {
                        let revised = self
                            .take_turn(Directive::ApplyRuling {
                                segment: self.candidate_outline.clone(),
                                instructions: instructions.clone(),
                            })
                            .await?;
                        let revised = extract_story_segment(&revised);
                        if revised.is_empty() {
                            self.candidate_outline.clone()
                        } else {
                            revised
                        }
                    }
                    Ruling::AcceptAsIs | Ruling::EscalateAndTruncate => {
                        self.candidate_outline.clone()
                    }
                };
                self.session.set_outline(outline)?;
                self.session.dispute_count = 0;
            }
            DisputeSubject::Checkpoint { .. } => {
                let outcome = match &ruling {
                    Ruling::AcceptAsIs => CheckpointOutcome::Disputed,
                    Ruling::RequireRevision(instructions) => {
                        let revised = self
                            .take_turn(Directive::ApplyRuling {
                                segment: self.session.draft.pending_segment().to_string(),
                                instructions: instructions.clone(),
                            })
                            .await?;
                        let revised = extract_story_segment(&revised);
                        if !revised.is_empty() {
                            self.session.draft.replace_pending(&revised);
                        }
                        CheckpointOutcome::Overridden
                    }
                    Ruling::EscalateAndTruncate => {
                        self.session.draft.truncate_to_agreed();
                        CheckpointOutcome::Overridden
                    }
                };
                self.close_checkpoints(outcome)?;
            }
        }

        Ok(self.after_checkpoint(format!(
            "dispute over {subject} resolved: {}",
            ruling.label()
        )))
    }

    async fn finalize(&mut self) -> CoordinatorResult<Step> {
        if self.session.draft.is_empty() {
            return Err(CoordinatorError::violation(
                Phase::Finalizing,
                "draft is empty at finalization",
            ));
        }

        let mut revisions = 0;
        let ruled_last = self
            .session
            .turns()
            .last()
            .is_some_and(|t| t.speaker == Role::Expert);
        if ruled_last {
            info!(session_id = %self.session.id, "expert ruling stands as the closing review");
        }
        while !ruled_last {
            let reply = self
                .take_turn(Directive::FinalReview {
                    draft: self.session.draft.text().to_string(),
                })
                .await?;
            let verdict = self.read_verdict(&reply, Role::Expert);
            if verdict.is_approved() || revisions >= self.config.final_revisions {
                break;
            }
            let revised = self
                .take_turn(Directive::FinalRevision {
                    draft: self.session.draft.text().to_string(),
                    notes: reply,
                })
                .await?;
            let revised = extract_story_segment(&revised);
            if !revised.is_empty() {
                self.session.draft.replace_all(&revised);
            }
            revisions += 1;
            if revisions >= self.config.final_revisions {
                break;
            }
        }

        let artifact = sanitize_text(self.session.draft.text()).trim().to_string();
        if artifact.is_empty() {
            return Err(CoordinatorError::violation(
                Phase::Finalizing,
                "artifact is empty after sanitizing",
            ));
        }
        self.artifact = Some(artifact);
        Ok(Step::to(
            Phase::Finalized,
            format!("closing review complete after {revisions} revision(s)"),
        ))
    }
}

/// Consume one reply, forwarding text fragments to observers as they arrive.
async fn collect_reply(
    agent: &RoleAgent,
    view: SessionView<'_>,
    directive: &Directive,
    phase: Phase,
    emitter: &mut EventEmitter,
) -> Result<String, GenerationFailure> {
    let role = agent.role();
    let mut stream = agent.respond(&view, directive).await?;
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        let fragment = item.map_err(|source| GenerationFailure {
            role,
            directive: directive.label(),
            source,
        })?;
        match fragment {
            Fragment::Text(chunk) => {
                let shown = sanitize_fragment(&chunk);
                if !shown.is_empty() {
                    emitter.emit(EventKind::AgentTurnFragment {
                        speaker: role,
                        phase,
                        content: shown,
                    });
                }
                text.push_str(&chunk);
            }
            Fragment::End => return Ok(text),
        }
    }
    Err(GenerationFailure {
        role,
        directive: directive.label(),
        source: GenerationError::MissingEndMarker,
    })
}
