//! Post-run session summary.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::agents::Role;
use crate::session::{word_count, Diagnostics, Phase, Session};

/// Turn count and time spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStats {
    pub turns: u32,
    pub elapsed_ms: u64,
}

impl TurnStats {
    fn add(&mut self, elapsed_ms: u64) {
        self.turns += 1;
        self.elapsed_ms += elapsed_ms;
    }

    pub fn average_ms(&self) -> u64 {
        if self.turns == 0 {
            0
        } else {
            self.elapsed_ms / u64::from(self.turns)
        }
    }
}

/// Aggregate view of a finished (or running) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub phase: Phase,
    pub total_turns: u32,
    pub total_elapsed_ms: u64,
    pub by_phase: BTreeMap<String, TurnStats>,
    pub by_speaker: BTreeMap<Role, TurnStats>,
    pub checkpoints_passed: usize,
    pub checkpoints_total: usize,
    /// Words in the artifact if finalized, else in the draft.
    pub words: usize,
    pub pages: f64,
    pub diagnostics: Diagnostics,
}

impl SessionSummary {
    pub fn from_session(session: &Session, words_per_unit: u32) -> Self {
        let mut by_phase: BTreeMap<String, TurnStats> = BTreeMap::new();
        let mut by_speaker: BTreeMap<Role, TurnStats> = BTreeMap::new();
        let mut total_elapsed_ms = 0;
        for turn in session.turns().iter() {
            by_phase
                .entry(turn.phase.to_string())
                .or_default()
                .add(turn.elapsed_ms);
            by_speaker.entry(turn.speaker).or_default().add(turn.elapsed_ms);
            total_elapsed_ms += turn.elapsed_ms;
        }
        let words = session
            .final_artifact()
            .map(word_count)
            .unwrap_or_else(|| session.draft.words());
        Self {
            session_id: session.id.to_string(),
            phase: session.phase(),
            total_turns: session.turns().len() as u32,
            total_elapsed_ms,
            by_phase,
            by_speaker,
            checkpoints_passed: session.current_checkpoint(),
            checkpoints_total: session.checkpoints().len(),
            words,
            pages: words as f64 / f64::from(words_per_unit.max(1)),
            diagnostics: session.diagnostics.clone(),
        }
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}\nSESSION SUMMARY ({})\n{rule}", self.session_id);
        let _ = writeln!(out, "Final phase: {}", self.phase);
        let _ = writeln!(out, "Total turns: {}", self.total_turns);
        let _ = writeln!(
            out,
            "Total time: {:.1}s",
            self.total_elapsed_ms as f64 / 1000.0
        );
        let _ = writeln!(
            out,
            "Checkpoints: {}/{}",
            self.checkpoints_passed, self.checkpoints_total
        );
        let _ = writeln!(out, "Length: {} words (~{:.1} pages)", self.words, self.pages);

        let _ = writeln!(out, "\nBy phase:");
        for (phase, stats) in &self.by_phase {
            let _ = writeln!(
                out,
                "  {phase}: {} turns, {:.1}s",
                stats.turns,
                stats.elapsed_ms as f64 / 1000.0
            );
        }
        let _ = writeln!(out, "\nBy speaker:");
        for (speaker, stats) in &self.by_speaker {
            let _ = writeln!(
                out,
                "  {speaker}: {} turns, avg {:.1}s/turn",
                stats.turns,
                stats.average_ms() as f64 / 1000.0
            );
        }
        let d = &self.diagnostics;
        if d != &Diagnostics::default() {
            let _ = writeln!(
                out,
                "\nRecovered: {} retries ({} timeouts), {} unparseable verdicts, {} forced disputes",
                d.retries, d.timeouts, d.unparseable_verdicts, d.forced_disputes
            );
        }
        out
    }
}
