//! Outline scope assessment.
//!
//! A rough complexity score for an outline, compared with what the target
//! length can hold (five points per unit). Counts are keyword hits, so the
//! score is a heuristic nudge for the Reader, never a gate.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static SCENES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)scene|moment|sequence|vignette|chapter|part").expect("SCENES regex should compile")
});
static CHARACTERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)character|protagonist|antagonist|dr\.|mr\.|ms\.|prof\.")
        .expect("CHARACTERS regex should compile")
});
static PLOT_BEATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)then|next|after|finally|revelation|twist|discovers|realizes")
        .expect("PLOT_BEATS regex should compile")
});
static DETAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)page \d+|specifically|detailed|extensive|multiple")
        .expect("DETAILS regex should compile")
});

/// Complexity points a single unit can hold.
pub const POINTS_PER_UNIT: f64 = 5.0;

/// How an outline's size compares with its target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFit {
    Appropriate,
    Ambitious,
    TooComplex,
}

/// Result of assessing one outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeAssessment {
    pub fit: ScopeFit,
    pub score: f64,
    pub max_score: f64,
    pub message: String,
}

impl ScopeAssessment {
    /// Whether the Reader and observers should be told.
    pub fn needs_attention(&self) -> bool {
        self.fit != ScopeFit::Appropriate
    }
}

/// Score an outline against a target length in units.
pub fn evaluate_outline_scope(outline: &str, target_length: u32) -> ScopeAssessment {
    let scenes = SCENES.find_iter(outline).count() as f64;
    let characters = CHARACTERS.find_iter(outline).count() as f64;
    let beats = PLOT_BEATS.find_iter(outline).count() as f64;
    let details = DETAILS.find_iter(outline).count() as f64;

    let score = scenes + characters + beats * 0.5 + details;
    let max_score = f64::from(target_length) * POINTS_PER_UNIT;

    let (fit, message) = if score > max_score * 1.5 {
        (
            ScopeFit::TooComplex,
            format!(
                "This outline appears too complex for {target_length} page(s) \
                 (complexity score: {score:.1}, recommended max: {max_score:.0})"
            ),
        )
    } else if score > max_score {
        (
            ScopeFit::Ambitious,
            format!(
                "This outline is ambitious for {target_length} page(s); focus on the core \
                 elements during writing"
            ),
        )
    } else {
        (
            ScopeFit::Appropriate,
            "Outline scope appears appropriate for the target length".to_string(),
        )
    };

    ScopeAssessment {
        fit,
        score,
        max_score,
        message,
    }
}
