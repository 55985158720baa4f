//! Structured run log.
//!
//! Every stage records what it did into a [`RunJournal`] handed to it by the
//! caller. Each entry is also emitted as a `tracing` event, so the journal
//! is a per-run copy of the log rather than a replacement for it.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

/// Severity of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Normal progress.
    Info,
    /// Something degraded but the run continues.
    Warn,
}

/// One journal line.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Milliseconds since the journal was created.
    pub elapsed_ms: u64,
    /// Pipeline stage, e.g. `"combine"`.
    pub stage: String,
    /// Severity.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
}

/// Timestamped log of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunJournal {
    started: Instant,
    entries: Vec<Entry>,
}

impl Default for RunJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl RunJournal {
    /// Start a journal; timestamps are relative to now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    /// Record a progress message.
    pub fn record(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        info!(stage, "{message}");
        self.push(stage, Level::Info, message);
    }

    /// Record a degradation.
    pub fn warn(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(stage, "{message}");
        self.push(stage, Level::Warn, message);
    }

    fn push(&mut self, stage: &str, level: Level, message: String) {
        self.entries.push(Entry {
            elapsed_ms: self.elapsed().as_millis() as u64,
            stage: stage.to_string(),
            level,
            message,
        });
    }

    /// Time since the journal was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// All entries in order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries for one stage.
    pub fn stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    /// True if any warning was recorded.
    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|e| e.level == Level::Warn)
    }

    /// Plain-text rendering, one line per entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            let tag = match e.level {
                Level::Info => "INFO",
                Level::Warn => "WARN",
            };
            let _ = writeln!(
                out,
                "[{:>8.3}s] {tag} {:<10} {}",
                e.elapsed_ms as f64 / 1000.0,
                e.stage,
                e.message
            );
        }
        out
    }
}
