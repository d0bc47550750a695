//! Draft text and story-segment extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agents::prompts::{STORY_BEGIN, STORY_END};
use crate::agents::Role;

/// Non-greedy block between the story markers.
static STORY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(STORY_BEGIN),
        regex::escape(STORY_END)
    ))
    .expect("STORY_BLOCK regex should compile")
});

/// Extract story prose from a Writer reply.
///
/// The last marked block wins. Without markers the whole reply is used,
/// minus hand-off tags.
pub fn extract_story_segment(reply: &str) -> String {
    if let Some(block) = STORY_BLOCK
        .captures_iter(reply)
        .last()
        .and_then(|c| c.get(1))
    {
        return block.as_str().trim().to_string();
    }
    let mut text = reply.to_string();
    for role in Role::ALL {
        text = text.replace(role.handoff_tag(), "");
    }
    text.trim().to_string()
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The accumulating story, with the offset of the last agreed point.
///
/// Everything before `agreed` has passed review; the tail is the segment
/// currently under review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Draft {
    text: String,
    agreed: usize,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn words(&self) -> usize {
        word_count(&self.text)
    }

    /// Length in units (pages) for a given page size.
    pub fn units(&self, words_per_unit: u32) -> f64 {
        self.words() as f64 / f64::from(words_per_unit.max(1))
    }

    /// Append a segment as a new paragraph block.
    pub fn append(&mut self, segment: &str) {
        let segment = segment.trim();
        if segment.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(segment);
    }

    /// Text written since the last agreed point.
    pub fn pending_segment(&self) -> &str {
        self.text[self.agreed..].trim_start()
    }

    /// Replace the segment under review.
    pub fn replace_pending(&mut self, segment: &str) {
        self.text.truncate(self.agreed);
        self.append(segment);
    }

    /// Drop the segment under review.
    pub fn truncate_to_agreed(&mut self) {
        self.text.truncate(self.agreed);
    }

    /// Mark everything written so far as agreed.
    pub fn mark_agreed(&mut self) {
        self.agreed = self.text.len();
    }

    /// Replace the whole story. Used by the closing revision.
    pub fn replace_all(&mut self, text: &str) {
        self.text = text.trim().to_string();
        self.agreed = self.text.len();
    }
}
