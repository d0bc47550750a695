//! Transcript rendering for the terminal.

use conversation::{EventKind, StoryEvent};

/// Output format for the event transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable transcript with streamed fragments.
    Text,
    /// One JSON event per line.
    Json,
}

/// Render one event. Text fragments carry no trailing newline.
pub fn render(event: &StoryEvent, format: Format) -> anyhow::Result<String> {
    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string(event)?)),
        Format::Text => Ok(render_text(&event.kind)),
    }
}

fn render_text(kind: &EventKind) -> String {
    match kind {
        EventKind::Status { phase, message } => format!("\n== [{phase}] {message}\n"),
        EventKind::AgentTurnStarted {
            speaker,
            directive,
            attempt,
            ..
        } => {
            if *attempt > 1 {
                format!("\n--- {speaker}: {directive} (attempt {attempt}) ---\n")
            } else {
                format!("\n--- {speaker}: {directive} ---\n")
            }
        }
        EventKind::AgentTurnFragment { content, .. } => content.clone(),
        EventKind::AgentTurnComplete { .. } => "\n".to_string(),
        EventKind::CheckpointReached {
            index,
            total,
            words,
            ..
        } => format!("\n>> checkpoint {index}/{total} reached at {words} words\n"),
        EventKind::DisputeOpened {
            subject,
            review_rounds,
            ..
        } => format!("\n!! dispute over {subject} after {review_rounds} review round(s)\n"),
        EventKind::DisputeResolved { subject, ruling, .. } => {
            format!("\n!! ruling on {subject}: {}\n", ruling.label())
        }
        EventKind::Completed { .. } => "\n== completed\n".to_string(),
        EventKind::Failed {
            phase,
            error_kind,
            message,
        } => format!("\n== failed in {phase} ({error_kind}): {message}\n"),
    }
}
