//! Moving converter outputs from a subdirectory into the batch root.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::matcher::OutputMatcher;

/// What happened to the matching files of one subdirectory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// File names moved into the destination.
    pub moved: Vec<String>,
    /// File names left in place because the destination already existed.
    pub conflicts: Vec<String>,
    /// Files that could not be moved, with the error that stopped each one.
    pub failed: Vec<FailedMove>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMove {
    pub name: String,
    pub error: String,
}

impl Collected {
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty() && self.conflicts.is_empty() && self.failed.is_empty()
    }

    /// Whether any matching file stayed behind in the subdirectory.
    pub fn has_leftovers(&self) -> bool {
        !self.conflicts.is_empty() || !self.failed.is_empty()
    }
}

/// List files directly inside `dir` whose names match, sorted.
///
/// Symlinks count when they resolve to a regular file, the same rule input
/// preflight uses.
pub fn matching_files(dir: &Path, matcher: &OutputMatcher) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if matcher.matches(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Move every matching file in `dir` into `dest`.
///
/// With `overwrite` unset, files whose destination exists stay in `dir` and are
/// reported as conflicts. A file that fails to move is recorded in
/// [`Collected::failed`] and the remaining files are still moved, so
/// `moved` always lists what actually reached `dest`. `Err` is returned only
/// when `dir` itself cannot be listed.
#[instrument(skip_all, fields(dir = %dir.display(), pattern = %matcher.describe()))]
pub fn collect_outputs(
    dir: &Path,
    dest: &Path,
    matcher: &OutputMatcher,
    overwrite: bool,
) -> Result<Collected> {
    let mut collected = Collected::default();
    for name in matching_files(dir, matcher)? {
        let from = dir.join(&name);
        let to = dest.join(&name);
        if to.exists() && !overwrite {
            warn!(file = %name, "output already exists in destination, leaving in place");
            collected.conflicts.push(name);
            continue;
        }
        match move_file(&from, &to) {
            Ok(()) => {
                debug!(file = %name, "collected output");
                collected.moved.push(name);
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(file = %name, err = %error, "failed to collect output");
                collected.failed.push(FailedMove { name, error });
            }
        }
    }
    Ok(collected)
}

/// Rename, falling back to copy + remove when the rename crosses devices.
///
/// A symlink source is resolved: the target's contents land at `to` and the
/// link is removed, so a relative link never dangles after the move.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    let is_link = fs::symlink_metadata(from)
        .with_context(|| format!("stat {}", from.display()))?
        .file_type()
        .is_symlink();
    if is_link {
        debug!(from = %from.display(), "output is a symlink, copying its target");
        fs::copy(from, to)
            .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
        return fs::remove_file(from).with_context(|| format!("remove {}", from.display()));
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            debug!(from = %from.display(), "rename crossed devices, copying");
            fs::copy(from, to)
                .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
            fs::remove_file(from).with_context(|| format!("remove {}", from.display()))
        }
        Err(err) => {
            Err(err).with_context(|| format!("move {} to {}", from.display(), to.display()))
        }
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}
