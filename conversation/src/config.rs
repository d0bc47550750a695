//! Coordinator, registry, and runtime settings.
//!
//! Settings load from an optional TOML file, then `STORY_*` environment
//! variables override individual fields. Every field has a default, so an
//! empty file (or none at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Retry policy for a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per turn, first attempt included.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Per-session coordinator behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Words in one unit (page) of target length.
    pub words_per_unit: u32,
    /// Reader request-changes rounds per outline or checkpoint before a dispute.
    pub review_ceiling: u32,
    /// Writer drafting turns per segment before the checkpoint counts as reached.
    pub max_segment_turns: u32,
    /// Writer revisions allowed after the Expert's closing review.
    pub final_revisions: u32,
    pub turn_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            words_per_unit: 300,
            review_ceiling: 2,
            max_segment_turns: 4,
            final_revisions: 1,
            turn_timeout_secs: 120,
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

/// Session registry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Live (non-terminal) sessions allowed at once.
    pub max_sessions: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_sessions: 16 }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub registry: RegistryConfig,
    /// Where artifacts and transcripts are written.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            registry: RegistryConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        None => Ok(None),
    }
}

impl Settings {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `STORY_*` overrides from an arbitrary lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_var(&lookup, "STORY_WORDS_PER_UNIT")? {
            self.coordinator.words_per_unit = v;
        }
        if let Some(v) = parse_var(&lookup, "STORY_TURN_TIMEOUT_SECS")? {
            self.coordinator.turn_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "STORY_MAX_ATTEMPTS")? {
            self.coordinator.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "STORY_MAX_SESSIONS")? {
            self.registry.max_sessions = v;
        }
        if let Some(dir) = lookup("STORY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self.validate()
    }

    /// Reject values that would stall or break a session.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.coordinator.words_per_unit > 0, "words_per_unit must be positive");
        anyhow::ensure!(self.coordinator.retry.max_attempts > 0, "max_attempts must be positive");
        anyhow::ensure!(self.coordinator.max_segment_turns > 0, "max_segment_turns must be positive");
        anyhow::ensure!(self.coordinator.turn_timeout_secs > 0, "turn_timeout_secs must be positive");
        anyhow::ensure!(self.registry.max_sessions > 0, "max_sessions must be positive");
        Ok(())
    }
}
