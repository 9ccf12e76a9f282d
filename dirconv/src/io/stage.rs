//! Staging the conversion helper into a subdirectory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

/// A helper file placed in a subdirectory for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedHelper {
    pub path: PathBuf,
    /// The file existed before staging and belongs to the user.
    pub preexisting: bool,
}

/// Check that the helper exists and is a regular file.
pub fn ensure_helper(helper: &Path) -> Result<()> {
    if !helper.exists() {
        return Err(anyhow!("missing helper {}", helper.display()));
    }
    if !helper.is_file() {
        return Err(anyhow!("helper is not a file: {}", helper.display()));
    }
    Ok(())
}

/// Copy `helper` into `dir` under its own file name.
///
/// An existing file of the same name is left untouched and reported as
/// pre-existing so that [`unstage_helper`] never deletes it.
pub fn stage_helper(helper: &Path, dir: &Path) -> Result<StagedHelper> {
    let file_name = helper
        .file_name()
        .ok_or_else(|| anyhow!("helper has no file name: {}", helper.display()))?;
    let dest = dir.join(file_name);
    if dest.exists() {
        warn!(path = %dest.display(), "helper already present, using existing file");
        return Ok(StagedHelper {
            path: dest,
            preexisting: true,
        });
    }
    fs::copy(helper, &dest)
        .with_context(|| format!("copy {} to {}", helper.display(), dest.display()))?;
    debug!(path = %dest.display(), "staged helper");
    Ok(StagedHelper {
        path: dest,
        preexisting: false,
    })
}

/// Remove a staged helper unless it pre-existed.
pub fn unstage_helper(staged: &StagedHelper) -> Result<()> {
    if staged.preexisting {
        return Ok(());
    }
    match fs::remove_file(&staged.path) {
        Ok(()) => Ok(()),
        // The converter may delete or move its own copy.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("remove staged helper {}", staged.path.display()))
        }
    }
}
