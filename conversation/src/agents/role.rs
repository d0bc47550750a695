//! Roles, directives, and the stateless role agent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::generation::{
    FragmentStream, GenerationFailure, GenerationRequest, Generator, HistoryEntry,
};
use super::prompts::{EXPERT_PERSONA, READER_PERSONA, WRITER_PERSONA};
use crate::request::StoryRequest;
use crate::session::{Phase, Turn};

/// A participant in the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Writer,
    Reader,
    Expert,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Writer, Role::Reader, Role::Expert];

    fn base_persona(self) -> &'static str {
        match self {
            Self::Writer => WRITER_PERSONA,
            Self::Reader => READER_PERSONA,
            Self::Expert => EXPERT_PERSONA,
        }
    }

    /// Persona rendered for one request.
    ///
    /// Every role sees the theme and scope; only the Writer gets the style knobs.
    pub fn persona(self, request: &StoryRequest) -> String {
        let mut persona = format!(
            "{}\n\n## Assignment\nTheme: {}\nLength: {} page(s); aim for {}.",
            self.base_persona(),
            request.theme(),
            request.target_length(),
            request.scope_guidance(),
        );
        if let Some(name) = request.protagonist() {
            persona.push_str(&format!("\nProtagonist: {name}"));
        }
        if self == Self::Writer {
            persona.push_str("\n\n## Style\n");
            persona.push_str(&request.style().render());
        }
        persona
    }

    /// Hand-off tag other roles use to address this one.
    pub fn handoff_tag(self) -> &'static str {
        match self {
            Self::Writer => "[@Writer]",
            Self::Reader => "[@Reader]",
            Self::Expert => "[@Expert]",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Writer => write!(f, "writer"),
            Self::Reader => write!(f, "reader"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

/// What a role is asked to do in one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    ProduceOutline {
        /// Reader notes from the previous rejected outline.
        revision_notes: Option<String>,
    },
    ReviewOutline {
        outline: String,
        /// Scope assessment to weigh, if the outline looked too large.
        scope_note: Option<String>,
    },
    ContinueDraft {
        /// 1-based index of the checkpoint being written toward; `None` for the ending.
        checkpoint: Option<usize>,
        target_words: usize,
        words_so_far: usize,
        pacing: String,
        final_segment: bool,
    },
    ReviewSegment {
        /// 1-based index of the last checkpoint this segment reaches.
        checkpoint: usize,
        segment: String,
    },
    ReviseSegment {
        segment: String,
        notes: String,
    },
    ResolveDispute {
        subject: String,
        disputed: String,
        writer_position: String,
        reader_position: String,
    },
    ApplyRuling {
        segment: String,
        instructions: String,
    },
    FinalReview {
        draft: String,
    },
    FinalRevision {
        draft: String,
        notes: String,
    },
}

impl Directive {
    /// Role that answers this directive.
    pub fn role(&self) -> Role {
        match self {
            Self::ProduceOutline { .. }
            | Self::ContinueDraft { .. }
            | Self::ReviseSegment { .. }
            | Self::ApplyRuling { .. }
            | Self::FinalRevision { .. } => Role::Writer,
            Self::ReviewOutline { .. } | Self::ReviewSegment { .. } => Role::Reader,
            Self::ResolveDispute { .. } | Self::FinalReview { .. } => Role::Expert,
        }
    }

    /// Short label for logs, events and failures.
    pub fn label(&self) -> String {
        match self {
            Self::ProduceOutline { revision_notes: None } => "produce outline".into(),
            Self::ProduceOutline { .. } => "revise outline".into(),
            Self::ReviewOutline { .. } => "review outline".into(),
            Self::ContinueDraft {
                checkpoint: Some(n),
                ..
            } => format!("continue draft to checkpoint {n}"),
            Self::ContinueDraft { .. } => "continue draft to the end".into(),
            Self::ReviewSegment { checkpoint, .. } => format!("review checkpoint {checkpoint}"),
            Self::ReviseSegment { .. } => "revise segment".into(),
            Self::ResolveDispute { .. } => "resolve dispute".into(),
            Self::ApplyRuling { .. } => "apply ruling".into(),
            Self::FinalReview { .. } => "final review".into(),
            Self::FinalRevision { .. } => "final revision".into(),
        }
    }

    /// The instruction text sent to the backend.
    pub fn render(&self) -> String {
        match self {
            Self::ProduceOutline { revision_notes } => {
                let mut text = String::from(
                    "Produce a concise outline for the story: premise, key scenes in order, \
                     and how it ends. Keep it proportional to the length.",
                );
                if let Some(notes) = revision_notes {
                    text.push_str("\n\nThe Reader rejected the previous outline:\n");
                    text.push_str(notes);
                    text.push_str("\n\nProduce a revised outline that addresses these notes.");
                }
                text
            }
            Self::ReviewOutline { outline, scope_note } => {
                let mut text = format!(
                    "Review this outline. Does it fit the requested length and theme?\n\n{outline}"
                );
                if let Some(note) = scope_note {
                    text.push_str("\n\nScope assessment:\n");
                    text.push_str(note);
                }
                text
            }
            Self::ContinueDraft {
                checkpoint,
                target_words,
                words_so_far,
                pacing,
                final_segment,
            } => {
                let goal = match checkpoint {
                    Some(n) => format!("checkpoint {n}"),
                    None => "the end of the story".to_string(),
                };
                let remaining = target_words.saturating_sub(*words_so_far);
                let mut text = format!(
                    "Continue the draft toward {goal}. The draft has {words_so_far} words; \
                     write about {remaining} more (to roughly {target_words} total).\n\
                     Pacing: {pacing}"
                );
                if *final_segment {
                    text.push_str(
                        "\nThis is the final segment. Resolve the open threads and end the story.",
                    );
                }
                text
            }
            Self::ReviewSegment {
                checkpoint,
                segment,
            } => format!(
                "The draft has reached checkpoint {checkpoint}. Review the new segment below \
                 for clarity, consistency and pacing.\n\n{segment}"
            ),
            Self::ReviseSegment { segment, notes } => format!(
                "Revise the segment below to address the Reader's notes. Return the full \
                 replacement segment.\n\nNotes:\n{notes}\n\nSegment:\n{segment}"
            ),
            Self::ResolveDispute {
                subject,
                disputed,
                writer_position,
                reader_position,
            } => format!(
                "The Writer and Reader cannot agree on {subject}. Issue a binding ruling.\n\n\
                 Disputed text:\n{disputed}\n\n\
                 Writer's latest position:\n{writer_position}\n\n\
                 Reader's latest position:\n{reader_position}"
            ),
            Self::ApplyRuling {
                segment,
                instructions,
            } => format!(
                "The Expert has ruled. Apply this revision exactly and return the full \
                 replacement text.\n\nRuling:\n{instructions}\n\nText:\n{segment}"
            ),
            Self::FinalReview { draft } => format!(
                "The draft is complete. Perform a closing pass for consistency, format and \
                 tone.\n\n{draft}"
            ),
            Self::FinalRevision { draft, notes } => format!(
                "Apply the Expert's closing notes and return the complete revised story.\n\n\
                 Notes:\n{notes}\n\nStory:\n{draft}"
            ),
        }
    }
}

/// Read-only projection of a session handed to an agent for one turn.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub request: &'a StoryRequest,
    pub phase: Phase,
    pub turns: &'a [Turn],
}

impl SessionView<'_> {
    fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .map(|t| HistoryEntry {
                speaker: t.speaker,
                content: t.content.clone(),
            })
            .collect()
    }
}

/// A role bound to a generation backend. Holds no per-session state.
#[derive(Clone)]
pub struct RoleAgent {
    role: Role,
    generator: Arc<dyn Generator>,
}

impl RoleAgent {
    pub fn new(role: Role, generator: Arc<dyn Generator>) -> Self {
        Self { role, generator }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Ask for one reply. The returned stream ends with `Fragment::End` on success.
    ///
    /// Failures are surfaced, never retried here.
    pub async fn respond(
        &self,
        view: &SessionView<'_>,
        directive: &Directive,
    ) -> Result<FragmentStream, GenerationFailure> {
        let request = GenerationRequest {
            role: self.role,
            persona: self.role.persona(view.request),
            history: view.history(),
            directive: directive.render(),
        };
        self.generator
            .generate(request)
            .await
            .map(|reply| reply.into_fragments())
            .map_err(|source| GenerationFailure {
                role: self.role,
                directive: directive.label(),
                source,
            })
    }
}

impl std::fmt::Debug for RoleAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAgent").field("role", &self.role).finish()
    }
}

/// One shared agent per role, reused across every session.
#[derive(Debug, Clone)]
pub struct AgentPool {
    writer: Arc<RoleAgent>,
    reader: Arc<RoleAgent>,
    expert: Arc<RoleAgent>,
}

impl AgentPool {
    pub fn new(
        writer: Arc<dyn Generator>,
        reader: Arc<dyn Generator>,
        expert: Arc<dyn Generator>,
    ) -> Self {
        Self {
            writer: Arc::new(RoleAgent::new(Role::Writer, writer)),
            reader: Arc::new(RoleAgent::new(Role::Reader, reader)),
            expert: Arc::new(RoleAgent::new(Role::Expert, expert)),
        }
    }

    /// All three roles backed by the same generator.
    pub fn uniform(generator: Arc<dyn Generator>) -> Self {
        Self::new(generator.clone(), generator.clone(), generator)
    }

    pub fn get(&self, role: Role) -> &RoleAgent {
        match role {
            Role::Writer => &self.writer,
            Role::Reader => &self.reader,
            Role::Expert => &self.expert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::generation::{Fragment, GenerationError, MockGenerator, Reply};
    use futures::StreamExt;

    fn request() -> StoryRequest {
        StoryRequest::new("a lighthouse that counts ships", 3)
            .unwrap()
            .with_protagonist("Dr. Vance")
    }

    #[test]
    fn test_directive_roles() {
        assert_eq!(
            Directive::ProduceOutline { revision_notes: None }.role(),
            Role::Writer
        );
        assert_eq!(
            Directive::ReviewSegment {
                checkpoint: 1,
                segment: String::new()
            }
            .role(),
            Role::Reader
        );
        assert_eq!(Directive::FinalReview { draft: String::new() }.role(), Role::Expert);
    }

    #[test]
    fn test_labels() {
        let d = Directive::ContinueDraft {
            checkpoint: Some(2),
            target_words: 600,
            words_so_far: 250,
            pacing: "x".into(),
            final_segment: false,
        };
        assert_eq!(d.label(), "continue draft to checkpoint 2");
        assert!(d.render().contains("write about 350 more"));
    }

    #[test]
    fn test_persona_style_only_for_writer() {
        let req = request();
        let writer = Role::Writer.persona(&req);
        let reader = Role::Reader.persona(&req);
        assert!(writer.contains("## Style"));
        assert!(!reader.contains("## Style"));
        assert!(reader.contains("Protagonist: Dr. Vance"));
        assert!(reader.contains("single-scene"));
    }

    #[tokio::test]
    async fn test_respond_wraps_failure_with_role_and_directive() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(GenerationError::Request("refused".into())));
        let agent = RoleAgent::new(Role::Reader, Arc::new(generator));
        let req = request();
        let view = SessionView {
            request: &req,
            phase: Phase::OutlineReview,
            turns: &[],
        };
        let directive = Directive::ReviewOutline {
            outline: "o".into(),
            scope_note: None,
        };
        let err = match agent.respond(&view, &directive).await {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.role, Role::Reader);
        assert_eq!(err.directive, "review outline");
    }

    #[tokio::test]
    async fn test_respond_passes_persona_and_directive() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .withf(|r| r.role == Role::Writer && r.persona.contains("Theme: a lighthouse"))
            .returning(|_| Ok(Reply::Complete("outline".into())));
        let agent = RoleAgent::new(Role::Writer, Arc::new(generator));
        let req = request();
        let view = SessionView {
            request: &req,
            phase: Phase::Outlining,
            turns: &[],
        };
        let stream = agent
            .respond(&view, &Directive::ProduceOutline { revision_notes: None })
            .await
            .unwrap();
        let fragments: Vec<_> = stream.collect().await;
        assert_eq!(fragments.last(), Some(&Ok(Fragment::End)));
    }
}
