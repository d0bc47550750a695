//! Story request: the immutable input of a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest supported target length, in units (pages).
pub const MIN_TARGET_UNITS: u32 = 1;
/// Largest supported target length, in units (pages).
pub const MAX_TARGET_UNITS: u32 = 10;

/// Validation errors for a [`StoryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("theme must not be empty")]
    EmptyTheme,

    #[error("target length {got} is outside the supported range {min}..={max}")]
    LengthOutOfRange { got: u32, min: u32, max: u32 },
}

/// How hard the story leans into its premise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Subtle,
    #[default]
    Moderate,
    Intense,
}

impl Intensity {
    /// Persona guidance for this intensity level.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Subtle => "Keep the tone restrained; let the unease build quietly.",
            Self::Moderate => "Balance atmosphere with clear stakes.",
            Self::Intense => "Lean into dread and escalation; do not pull punches.",
        }
    }
}

impl std::fmt::Display for Intensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subtle => write!(f, "subtle"),
            Self::Moderate => write!(f, "moderate"),
            Self::Intense => write!(f, "intense"),
        }
    }
}

impl std::str::FromStr for Intensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subtle" | "low" => Ok(Self::Subtle),
            "moderate" | "medium" => Ok(Self::Moderate),
            "intense" | "high" => Ok(Self::Intense),
            other => Err(format!("unknown intensity '{other}'")),
        }
    }
}

/// Named style knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleOptions {
    #[serde(default)]
    pub intensity: Intensity,
    /// Render classified details with redaction bars.
    #[serde(default)]
    pub redaction: bool,
    /// Free-form knobs passed through to the Writer persona.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl StyleOptions {
    /// Render the knobs as persona lines.
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "Intensity: {}. {}",
            self.intensity,
            self.intensity.guidance()
        )];
        if self.redaction {
            lines.push(
                "Use redaction bars (█████) and [REDACTED] / [DATA EXPUNGED] markers for \
                 classified details."
                    .to_string(),
            );
        }
        for (knob, value) in &self.extra {
            lines.push(format!("{knob}: {value}"));
        }
        lines.join("\n")
    }
}

/// A request for one story. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    theme: String,
    target_length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protagonist: Option<String>,
    #[serde(default)]
    style: StyleOptions,
}

impl StoryRequest {
    /// Create a validated request.
    pub fn new(theme: impl Into<String>, target_length: u32) -> Result<Self, RequestError> {
        let request = Self {
            theme: theme.into().trim().to_string(),
            target_length,
            protagonist: None,
            style: StyleOptions::default(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Set the protagonist name. Blank names are ignored.
    pub fn with_protagonist(mut self, name: impl Into<String>) -> Self {
        let name = name.into().trim().to_string();
        self.protagonist = (!name.is_empty()).then_some(name);
        self
    }

    /// Replace the style knobs.
    pub fn with_style(mut self, style: StyleOptions) -> Self {
        self.style = style;
        self
    }

    /// Check the request invariants. Deserialized requests must pass this before use.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.theme.trim().is_empty() {
            return Err(RequestError::EmptyTheme);
        }
        if !(MIN_TARGET_UNITS..=MAX_TARGET_UNITS).contains(&self.target_length) {
            return Err(RequestError::LengthOutOfRange {
                got: self.target_length,
                min: MIN_TARGET_UNITS,
                max: MAX_TARGET_UNITS,
            });
        }
        Ok(())
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    pub fn protagonist(&self) -> Option<&str> {
        self.protagonist.as_deref()
    }

    pub fn style(&self) -> &StyleOptions {
        &self.style
    }

    /// Total word budget for the story.
    pub fn total_words(&self, words_per_unit: u32) -> u32 {
        self.target_length * words_per_unit
    }

    /// How much story fits in the target length.
    pub fn scope_guidance(&self) -> &'static str {
        match self.target_length {
            0..=3 => "a focused, single-scene story with a minimal cast",
            4..=5 => "a story with two or three key scenes and a small cast",
            _ => "a multi-scene narrative with developed characters",
        }
    }
}
