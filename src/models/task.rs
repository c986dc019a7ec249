//! Terminal result of converting one object.

use crate::errors::TaskError;

/// Why a key was left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The derived target key is already present in the bucket.
    AlreadyExists,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
        }
    }
}

/// Produced exactly once per discovered key and consumed by the run report.
#[derive(Debug)]
pub enum TaskOutcome {
    Skipped(SkipReason),
    Converted {
        original_size: usize,
        converted_size: usize,
    },
    Failed {
        key: String,
        cause: TaskError,
    },
    DryRunPlanned,
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}
