//! Run-wide accounting.
//!
//! `RunReport` is owned by the scheduler and only touched from its completion
//! loop, so it carries no synchronization of its own.

use crate::models::task::TaskOutcome;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::info;

/// Emit a progress line every this many completions.
pub const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Default)]
pub struct RunReport {
    total_discovered: usize,
    total_processed: usize,
    failed_keys: Vec<String>,
    converted: usize,
    skipped: usize,
    planned: usize,
    bytes_in: u64,
    bytes_out: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a page's worth of filtered keys, before any of them is scheduled.
    pub fn record_discovered(&mut self, count: usize) {
        self.total_discovered += count;
    }

    /// Account for one terminal outcome.
    ///
    /// Returns `true` when a progress line is due (every [`PROGRESS_EVERY`]
    /// completions, and when the discovered set is fully processed).
    pub fn record_outcome(&mut self, key: &str, outcome: &TaskOutcome) -> bool {
        debug_assert!(self.total_processed < self.total_discovered);
        self.total_processed += 1;
        match outcome {
            TaskOutcome::Skipped(_) => self.skipped += 1,
            TaskOutcome::DryRunPlanned => self.planned += 1,
            TaskOutcome::Converted {
                original_size,
                converted_size,
            } => {
                self.converted += 1;
                self.bytes_in += *original_size as u64;
                self.bytes_out += *converted_size as u64;
            }
            TaskOutcome::Failed { .. } => self.failed_keys.push(key.to_string()),
        }
        self.total_processed % PROGRESS_EVERY == 0 || self.total_processed == self.total_discovered
    }

    pub fn total_discovered(&self) -> usize {
        self.total_discovered
    }

    pub fn total_processed(&self) -> usize {
        self.total_processed
    }

    pub fn failed_keys(&self) -> &[String] {
        &self.failed_keys
    }

    pub fn converted(&self) -> usize {
        self.converted
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn planned(&self) -> usize {
        self.planned
    }

    pub fn log_progress(&self) {
        let pct = if self.total_discovered == 0 {
            100.0
        } else {
            self.total_processed as f64 * 100.0 / self.total_discovered as f64
        };
        info!(
            "Progress: {}/{} ({:.1}%)",
            self.total_processed, self.total_discovered, pct
        );
    }

    pub fn log_summary(&self) {
        info!(
            converted = self.converted,
            skipped = self.skipped,
            planned = self.planned,
            failed = self.failed_keys.len(),
            "Processed {} of {} discovered keys ({:.1} KB -> {:.1} KB)",
            self.total_processed,
            self.total_discovered,
            self.bytes_in as f64 / 1024.0,
            self.bytes_out as f64 / 1024.0
        );
    }

    /// Hand over the failed keys, in the order they failed.
    pub fn finalize(self) -> FailureSummary {
        FailureSummary {
            failed_keys: self.failed_keys,
        }
    }
}

/// Keys whose conversion failed, ready to be persisted by the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FailureSummary {
    pub failed_keys: Vec<String>,
}

impl FailureSummary {
    pub fn is_empty(&self) -> bool {
        self.failed_keys.is_empty()
    }

    /// Write one key per line to `path`. Nothing is written when there are no
    /// failures; returns the path only when a file was produced.
    pub async fn persist(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        if self.is_empty() {
            return Ok(None);
        }
        tokio::fs::write(path, self.failed_keys.join("\n")).await?;
        Ok(Some(path.to_path_buf()))
    }
}
