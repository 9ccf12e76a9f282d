//! Batch configuration stored in `dirconv.toml` at the batch root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::matcher::OutputMatcher;

/// File name of the config looked up in the batch root.
pub const CONFIG_FILE_NAME: &str = "dirconv.toml";

/// Batch configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the
/// text-to-ebook workflow the tool was first written for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Helper file copied into each subdirectory, relative to the root.
    pub helper: PathBuf,

    /// Command (argv) run inside each subdirectory.
    pub command: Vec<String>,

    /// Extension of the files the converter produces, without the dot.
    pub output_extension: String,

    /// Regex on file names; when set it replaces `output_extension` matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_pattern: Option<String>,

    /// Extensions a subdirectory must contain at least one file of.
    pub required_extensions: Vec<String>,

    /// Also process subdirectories whose name starts with `.`.
    pub include_hidden: bool,

    /// Per-directory converter wall-clock budget in seconds.
    pub timeout_secs: u64,

    /// Truncate captured converter stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Delete the staged helper after each directory.
    pub remove_helper: bool,

    /// Replace outputs that already exist in the root.
    pub overwrite: bool,

    /// Stop at the first failing directory.
    pub fail_fast: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            helper: PathBuf::from("converter.py"),
            command: vec!["python3".to_string(), "converter.py".to_string()],
            output_extension: "epub".to_string(),
            output_pattern: None,
            required_extensions: vec!["txt".to_string()],
            include_hidden: false,
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            remove_helper: true,
            overwrite: false,
            fail_fast: false,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.helper.as_os_str().is_empty() {
            return Err(anyhow!("helper must not be empty"));
        }
        if self.helper.file_name().is_none() {
            return Err(anyhow!("helper must name a file: {}", self.helper.display()));
        }
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.output_pattern.is_none() {
            check_extension("output_extension", &self.output_extension)?;
        }
        for ext in &self.required_extensions {
            check_extension("required_extensions", ext)?;
        }
        self.output_matcher()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn output_matcher(&self) -> Result<OutputMatcher> {
        OutputMatcher::new(&self.output_extension, self.output_pattern.as_deref())
    }

    /// Resolve the helper path against the batch root.
    pub fn helper_path(&self, root: &Path) -> PathBuf {
        if self.helper.is_absolute() {
            self.helper.clone()
        } else {
            root.join(&self.helper)
        }
    }
}

fn check_extension(field: &str, ext: &str) -> Result<()> {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        return Err(anyhow!("{field} entries must not be empty"));
    }
    if ext.contains(['.', '/', '\\']) {
        return Err(anyhow!("{field} entry {ext:?} must be a bare extension"));
    }
    Ok(())
}

/// Command-line overrides applied on top of the file config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub fail_fast: bool,
    pub overwrite: bool,
    pub keep_helper: bool,
}

impl ConfigOverrides {
    /// Flags only ever switch behavior on; absent flags keep file values.
    pub fn apply(&self, mut cfg: BatchConfig) -> BatchConfig {
        if self.fail_fast {
            cfg.fail_fast = true;
        }
        if self.overwrite {
            cfg.overwrite = true;
        }
        if self.keep_helper {
            cfg.remove_helper = false;
        }
        cfg
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BatchConfig::default()`.
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    if !path.exists() {
        let cfg = BatchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BatchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BatchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
