//! Checkpoint schedule: where the Reader pauses the draft for review.
//!
//! The schedule is derived once from the target length and never changes:
//!
//! ```text
//! target ≤ 2   → one checkpoint at target / 2
//! target 3..=5 → every unit: 1, 2, .., target-1
//! target ≥ 6   → every two units below target-1, then target-1
//! ```
//!
//! Every rule keeps the schedule non-empty, strictly increasing, inside
//! `(0, target)`, no longer than `target`, and always places a checkpoint
//! before the final unit.

use serde::{Deserialize, Serialize};

/// Whether a checkpoint has been reviewed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Passed,
}

/// How a checkpoint was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointOutcome {
    /// Not yet closed.
    None,
    /// Reader approved the segment.
    Approved,
    /// Expert ruled to keep the segment as written.
    Disputed,
    /// Expert imposed a revision, or truncated an unresolvable segment.
    Overridden,
}

impl std::fmt::Display for CheckpointOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Approved => write!(f, "approved"),
            Self::Disputed => write!(f, "disputed"),
            Self::Overridden => write!(f, "overridden"),
        }
    }
}

/// A scheduled progress review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Position in units (pages) from the start of the story.
    pub at_units: f64,
    /// `at_units / target_length`.
    pub fraction: f64,
    pub status: CheckpointStatus,
    pub outcome: CheckpointOutcome,
}

impl Checkpoint {
    fn new(at_units: f64, target: u32) -> Self {
        Self {
            at_units,
            fraction: at_units / f64::from(target),
            status: CheckpointStatus::Pending,
            outcome: CheckpointOutcome::None,
        }
    }

    /// Word count at which this checkpoint is reached.
    pub fn word_target(&self, words_per_unit: u32) -> usize {
        (self.at_units * f64::from(words_per_unit)).round() as usize
    }

    pub fn is_passed(&self) -> bool {
        self.status == CheckpointStatus::Passed
    }
}

/// The immutable, ordered checkpoint plan for a target length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSchedule {
    target_length: u32,
    points: Vec<f64>,
}

impl CheckpointSchedule {
    /// Derive the schedule for a target length in units.
    ///
    /// A zero target is treated as one unit so the schedule is never empty.
    pub fn for_length(target_length: u32) -> Self {
        let target = target_length.max(1);
        let points = match target {
            1 | 2 => vec![f64::from(target) / 2.0],
            3..=5 => (1..target).map(f64::from).collect(),
            _ => {
                let penultimate = target - 1;
                let mut points: Vec<f64> = (1..)
                    .map(|i| i * 2)
                    .take_while(|&u| u < penultimate)
                    .map(f64::from)
                    .collect();
                points.push(f64::from(penultimate));
                points
            }
        };
        Self {
            target_length: target,
            points,
        }
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    /// Checkpoint positions in units.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fresh, pending checkpoints for a new session.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.points
            .iter()
            .map(|&at| Checkpoint::new(at, self.target_length))
            .collect()
    }
}

/// Pacing recommendation for the Writer given progress through the story.
pub fn pacing_note(progress_units: f64, target_length: u32) -> &'static str {
    let fraction = progress_units / f64::from(target_length.max(1));
    if fraction < 1.0 / 6.0 {
        "Early development: establish atmosphere and the core concept."
    } else if fraction < 1.0 / 3.0 {
        "Building tension: develop the anomaly and its implications."
    } else if fraction < 0.5 {
        "Mid-story: escalate the stakes and reveal key information."
    } else if fraction < 2.0 / 3.0 {
        "Approaching the climax: build toward the revelation or crisis."
    } else if fraction < 5.0 / 6.0 {
        "Begin the resolution: start tying up plot threads."
    } else {
        "Final stretch: focus on a satisfying conclusion."
    }
}
