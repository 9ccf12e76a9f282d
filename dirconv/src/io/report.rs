//! Run reports under `.dirconv/runs/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::core::types::BatchSummary;

/// Name of the state directory created in the batch root.
pub const STATE_DIR_NAME: &str = ".dirconv";

/// Canonical paths for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_id: String,
    pub dir: PathBuf,
    pub report_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, run_id: &str) -> Self {
        let dir = root.join(STATE_DIR_NAME).join("runs").join(run_id);
        Self {
            run_id: run_id.to_string(),
            report_path: dir.join("report.json"),
            logs_dir: dir.join("logs"),
            dir,
        }
    }

    /// Converter log for a subdirectory.
    pub fn log_path(&self, dir_name: &str) -> PathBuf {
        self.logs_dir.join(format!("{dir_name}.log"))
    }

    /// Allocate a fresh run directory named after `now`.
    ///
    /// A `-N` suffix is appended when a run from the same second exists.
    pub fn allocate(root: &Path, now: DateTime<Utc>) -> Result<Self> {
        let base = run_id_for(now);
        let mut run_id = base.clone();
        let mut suffix = 2u32;
        loop {
            let paths = Self::new(root, &run_id);
            if !paths.dir.exists() {
                fs::create_dir_all(&paths.logs_dir)
                    .with_context(|| format!("create run dir {}", paths.dir.display()))?;
                return Ok(paths);
            }
            run_id = format!("{base}-{suffix}");
            suffix += 1;
        }
    }
}

pub fn run_id_for(now: DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%d_%H%M%S"))
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write `report.json` for a finished run.
pub fn write_report(paths: &RunPaths, summary: &BatchSummary) -> Result<()> {
    write_json(&paths.report_path, summary)
}

/// Read a report back, e.g. for tests and tooling.
pub fn load_report(path: &Path) -> Result<BatchSummary> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}
