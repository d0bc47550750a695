//! Review verdict parsing.
//!
//! Reviews end with `VERDICT: APPROVE` or `VERDICT: REQUEST_CHANGES`. Free-form
//! approval phrases ("I APPROVE this story") are accepted when no verdict line
//! is present. Anything missing, contradictory or unrecognised is read as
//! request-changes and flagged, so review never fails toward silent approval.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*verdict\W*:\W*(approve[sd]?|request[_\s-]*changes)\b")
        .expect("VERDICT_LINE regex should compile")
});

const APPROVAL_PHRASES: &[&str] = &[
    "i approve this story",
    "i approve the story",
    "i approve this outline",
    "i approve the outline",
    "story is approved",
    "outline is approved",
    "technical review passed",
];

const NEGATIONS: &[&str] = &[
    "do not approve",
    "don't approve",
    "cannot approve",
    "can't approve",
    "not approved",
    "request changes",
];

/// A reviewer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    RequestChanges,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::RequestChanges => write!(f, "request_changes"),
        }
    }
}

/// Outcome of parsing one review reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    /// False when the reply had no usable verdict and the tie-break applied.
    pub parsed: bool,
}

impl ParsedVerdict {
    pub fn is_approved(&self) -> bool {
        self.verdict == Verdict::Approve
    }

    fn unparseable() -> Self {
        Self {
            verdict: Verdict::RequestChanges,
            parsed: false,
        }
    }
}

/// Parse a Reader or Expert review.
pub fn parse_verdict(reply: &str) -> ParsedVerdict {
    let mut approve = false;
    let mut changes = false;
    for cap in VERDICT_LINE.captures_iter(reply) {
        if cap[1].to_ascii_lowercase().starts_with("approve") {
            approve = true;
        } else {
            changes = true;
        }
    }
    match (approve, changes) {
        (true, false) => {
            return ParsedVerdict {
                verdict: Verdict::Approve,
                parsed: true,
            }
        }
        (false, true) => {
            return ParsedVerdict {
                verdict: Verdict::RequestChanges,
                parsed: true,
            }
        }
        (true, true) => return ParsedVerdict::unparseable(),
        (false, false) => {}
    }

    let lower = reply.to_lowercase();
    let approved = APPROVAL_PHRASES.iter().any(|p| lower.contains(p));
    let negated = NEGATIONS.iter().any(|p| lower.contains(p));
    if approved && !negated {
        ParsedVerdict {
            verdict: Verdict::Approve,
            parsed: true,
        }
    } else {
        ParsedVerdict::unparseable()
    }
}
