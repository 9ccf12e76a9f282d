//! Scaffolding for `dirconv init`.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use super::config::{BatchConfig, CONFIG_FILE_NAME, write_config};

/// Options for `init_config`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Write a default `dirconv.toml` into `root`.
///
/// Fails if the file already exists unless `options.force` is set.
pub fn init_config(root: &Path, options: &InitOptions) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(anyhow!("dirconv init: {} is not a directory", root.display()));
    }
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() && !options.force {
        return Err(anyhow!(
            "dirconv init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(&path, &BatchConfig::default())?;
    Ok(path)
}
