//! Planning helpers for `dirconv plan` and `dirconv run`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::io::config::BatchConfig;
use crate::io::discover::{Candidate, DiscoverOptions, list_subdirectories, missing_inputs};
use crate::io::report::STATE_DIR_NAME;

/// Whether a candidate will be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStatus {
    Ready,
    /// Not processed; the string says why.
    Skip(String),
    /// Preflight itself failed, e.g. the directory could not be read.
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub candidate: Candidate,
    pub status: PlanStatus,
}

impl PlanEntry {
    pub fn is_ready(&self) -> bool {
        self.status == PlanStatus::Ready
    }
}

/// Discover subdirectories of `root` and run the input preflight on each.
///
/// The tool's own state directory is never part of a plan. Only an unreadable
/// root is an error; a subdirectory whose preflight fails gets a
/// [`PlanStatus::Fail`] entry and the rest of the plan is still built.
pub fn build_plan(root: &Path, cfg: &BatchConfig) -> Result<Vec<PlanEntry>> {
    let options = DiscoverOptions {
        include_hidden: cfg.include_hidden,
    };
    let candidates = list_subdirectories(root, &options).context("discover subdirectories")?;
    Ok(candidates
        .into_iter()
        .filter(|candidate| candidate.name != STATE_DIR_NAME)
        .map(|candidate| plan_entry(candidate, cfg))
        .collect())
}

/// Preflight a single candidate.
pub fn plan_entry(candidate: Candidate, cfg: &BatchConfig) -> PlanEntry {
    let status = match missing_inputs(&candidate.path, &cfg.required_extensions) {
        Ok(missing) if missing.is_empty() => PlanStatus::Ready,
        Ok(missing) => {
            let list = missing
                .iter()
                .map(|ext| format!("*.{ext}"))
                .collect::<Vec<_>>()
                .join(", ");
            PlanStatus::Skip(format!("missing input {list}"))
        }
        Err(err) => {
            warn!(dir = %candidate.name, err = %format!("{err:#}"), "preflight failed");
            PlanStatus::Fail(format!("preflight failed: {err:#}"))
        }
    };
    PlanEntry { candidate, status }
}
