//! Dispute resolution: expert rulings on Writer/Reader deadlocks.
//!
//! A dispute bundles the contested text and both parties' latest positions
//! into a single Expert directive. The reply is parsed into a binding
//! [`Ruling`]; an unparseable reply becomes [`Ruling::EscalateAndTruncate`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agents::{Directive, Role};
use crate::session::Session;

static RULING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*ruling\W*:\W*(accept|revise)\b[ \t:.\-]*(.*)$")
        .expect("RULING_LINE regex should compile")
});

/// What is being disputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisputeSubject {
    Outline,
    /// 1-based checkpoint number.
    Checkpoint { index: usize },
}

impl std::fmt::Display for DisputeSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outline => write!(f, "the outline"),
            Self::Checkpoint { index } => write!(f, "the segment at checkpoint {index}"),
        }
    }
}

/// Binding Expert decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ruling", content = "instructions", rename_all = "snake_case")]
pub enum Ruling {
    /// Keep the disputed text as written.
    AcceptAsIs,
    /// The Writer must make this revision.
    RequireRevision(String),
    /// The ruling could not be parsed.
    EscalateAndTruncate,
}

impl Ruling {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AcceptAsIs => "accept_as_is",
            Self::RequireRevision(_) => "require_revision",
            Self::EscalateAndTruncate => "escalate_and_truncate",
        }
    }
}

/// Everything the Expert sees about one dispute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeContext {
    pub subject: DisputeSubject,
    pub disputed: String,
    pub writer_position: String,
    pub reader_position: String,
}

/// Builds dispute directives and parses rulings. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisputeResolver;

impl DisputeResolver {
    /// Gather the dispute context from the session's latest turns.
    pub fn context(&self, session: &Session, subject: DisputeSubject) -> DisputeContext {
        let disputed = match subject {
            DisputeSubject::Outline => session
                .turns()
                .last_by(Role::Writer)
                .map(|t| t.content.clone())
                .unwrap_or_default(),
            DisputeSubject::Checkpoint { .. } => session.draft.pending_segment().to_string(),
        };
        let position = |role| {
            session
                .turns()
                .last_by(role)
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "(no position recorded)".to_string())
        };
        DisputeContext {
            subject,
            disputed,
            writer_position: position(Role::Writer),
            reader_position: position(Role::Reader),
        }
    }

    /// The single Expert directive for a dispute.
    pub fn directive(&self, context: &DisputeContext) -> Directive {
        Directive::ResolveDispute {
            subject: context.subject.to_string(),
            disputed: context.disputed.clone(),
            writer_position: context.writer_position.clone(),
            reader_position: context.reader_position.clone(),
        }
    }

    /// Parse an Expert reply. Contradictory or missing ruling lines escalate.
    pub fn parse_ruling(&self, reply: &str) -> Ruling {
        let mut accept = false;
        let mut revise: Option<String> = None;
        for cap in RULING_LINE.captures_iter(reply) {
            if cap[1].eq_ignore_ascii_case("accept") {
                accept = true;
            } else {
                let inline = cap[2].trim().to_string();
                let rest = cap
                    .get(0)
                    .map(|m| reply[m.end()..].trim().to_string())
                    .unwrap_or_default();
                let instructions = match (inline.is_empty(), rest.is_empty()) {
                    (false, true) => inline,
                    (false, false) => format!("{inline}\n{rest}"),
                    (true, false) => rest,
                    (true, true) => String::new(),
                };
                revise = Some(instructions);
            }
        }
        match (accept, revise) {
            (true, None) => Ruling::AcceptAsIs,
            (false, Some(instructions)) if !instructions.is_empty() => {
                Ruling::RequireRevision(instructions)
            }
            _ => Ruling::EscalateAndTruncate,
        }
    }
}
