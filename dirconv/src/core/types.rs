//! Shared deterministic types for batch outcomes.
//!
//! These types are the stable contract between the batch orchestration, the
//! CLI output, and the on-disk run report.

use serde::{Deserialize, Serialize};

/// Final classification of a single subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirStatus {
    /// Converter succeeded and every matching output was collected.
    Converted,
    /// Converter succeeded but produced no matching file.
    NoOutput,
    /// Converter exited with a non-zero status.
    ConverterFailed,
    /// Converter exceeded its timeout and was killed.
    TimedOut,
    /// Directory was not processed (preflight failed).
    Skipped,
    /// Staging, collection, or process spawning failed.
    Error,
}

impl DirStatus {
    /// Whether this status counts against the batch exit code.
    pub fn is_failure(self) -> bool {
        !matches!(self, DirStatus::Converted | DirStatus::Skipped)
    }

    pub fn label(self) -> &'static str {
        match self {
            DirStatus::Converted => "converted",
            DirStatus::NoOutput => "no_output",
            DirStatus::ConverterFailed => "converter_failed",
            DirStatus::TimedOut => "timed_out",
            DirStatus::Skipped => "skipped",
            DirStatus::Error => "error",
        }
    }
}

/// Recorded result for one subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirOutcome {
    pub name: String,
    pub status: DirStatus,
    /// File names moved into the root, in move order.
    #[serde(default)]
    pub collected: Vec<String>,
    /// Matching file names left in place because the destination existed.
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl DirOutcome {
    pub fn new(name: impl Into<String>, status: DirStatus) -> Self {
        Self {
            name: name.into(),
            status,
            collected: Vec::new(),
            conflicts: Vec::new(),
            message: None,
            exit_code: None,
            duration_ms: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Per-status counts over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub converted: u32,
    pub skipped: u32,
    pub failed: u32,
    pub outputs: u32,
}

impl BatchCounts {
    pub fn tally(outcomes: &[DirOutcome]) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            match outcome.status {
                DirStatus::Converted => counts.converted += 1,
                DirStatus::Skipped => counts.skipped += 1,
                _ => counts.failed += 1,
            }
            counts.outputs += outcome.collected.len() as u32;
        }
        counts
    }
}

/// Summary of one `dirconv run` invocation, persisted as `report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub root: String,
    pub started_at: String,
    pub ended_at: String,
    /// True when `fail_fast` stopped the batch before every directory ran.
    #[serde(default)]
    pub stopped_early: bool,
    pub counts: BatchCounts,
    pub outcomes: Vec<DirOutcome>,
}
