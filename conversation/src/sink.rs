//! Artifact persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::session::{SessionId, Turn};

/// Artifact file name inside a session directory.
pub const ARTIFACT_FILE: &str = "story.md";
/// Transcript file name inside a session directory. One JSON turn per line.
pub const TRANSCRIPT_FILE: &str = "transcript.jsonl";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives the final artifact and full turn log of a finalized session.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(
        &self,
        session_id: SessionId,
        artifact: &str,
        turns: &[Turn],
    ) -> Result<(), SinkError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ArtifactSink for NullSink {
    async fn persist(&self, _: SessionId, _: &str, _: &[Turn]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes `<root>/<session>/story.md` and `<root>/<session>/transcript.jsonl`.
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    root: PathBuf,
}

impl FileArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one session.
    pub fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.root.join(session_id.to_string())
    }
}

/// Render turns as JSON lines.
pub fn transcript_jsonl(turns: &[Turn]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&serde_json::to_string(turn)?);
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn persist(
        &self,
        session_id: SessionId,
        artifact: &str,
        turns: &[Turn],
    ) -> Result<(), SinkError> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut story = artifact.trim_end().to_string();
        story.push('\n');
        tokio::fs::write(dir.join(ARTIFACT_FILE), story).await?;
        tokio::fs::write(dir.join(TRANSCRIPT_FILE), transcript_jsonl(turns)?).await?;

        info!(%session_id, dir = %dir.display(), turns = turns.len(), "artifact persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Role;
    use crate::session::{Phase, TurnLog};

    #[tokio::test]
    async fn test_file_sink_writes_story_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileArtifactSink::new(dir.path());
        let id = SessionId::new();

        let mut log = TurnLog::new();
        log.push(Role::Writer, Phase::Outlining, "outline".into(), 12);
        log.push(Role::Reader, Phase::OutlineReview, "VERDICT: APPROVE".into(), 8);

        sink.persist(id, "The end.", log.as_slice()).await.unwrap();

        let session_dir = sink.session_dir(id);
        let story = std::fs::read_to_string(session_dir.join(ARTIFACT_FILE)).unwrap();
        assert_eq!(story, "The end.\n");

        let transcript = std::fs::read_to_string(session_dir.join(TRANSCRIPT_FILE)).unwrap();
        let lines: Vec<&str> = transcript.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Turn = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.speaker, Role::Writer);
    }

    #[tokio::test]
    async fn test_null_sink() {
        assert!(NullSink.persist(SessionId::new(), "x", &[]).await.is_ok());
    }
}
