//! File name matching for converter outputs.

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Decides which file names count as converter output.
#[derive(Debug, Clone)]
pub enum OutputMatcher {
    /// Case-sensitive `.<ext>` suffix, mirroring a shell `*.ext` glob.
    Extension(String),
    /// Regular expression applied to the whole file name.
    Pattern(Regex),
}

impl OutputMatcher {
    /// Build a matcher; a pattern, when given, takes precedence over the extension.
    pub fn new(extension: &str, pattern: Option<&str>) -> Result<Self> {
        if let Some(pattern) = pattern {
            let regex =
                Regex::new(pattern).with_context(|| format!("compile output_pattern {pattern:?}"))?;
            return Ok(Self::Pattern(regex));
        }
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            bail!("output extension must not be empty");
        }
        Ok(Self::Extension(extension.to_string()))
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            Self::Extension(ext) => file_name
                .strip_suffix(ext.as_str())
                .and_then(|stem| stem.strip_suffix('.'))
                .is_some_and(|stem| !stem.is_empty()),
            Self::Pattern(regex) => regex.is_match(file_name),
        }
    }

    /// Short human-readable form for log lines.
    pub fn describe(&self) -> String {
        match self {
            Self::Extension(ext) => format!("*.{ext}"),
            Self::Pattern(regex) => format!("/{}/", regex.as_str()),
        }
    }
}
