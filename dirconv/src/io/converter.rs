//! Converter abstraction for per-directory invocation.
//!
//! The [`Converter`] trait decouples batch orchestration from the external
//! conversion program. Tests use scripted converters that write output files
//! without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for one converter invocation.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Subdirectory the converter runs in.
    pub workdir: PathBuf,
    /// Path to write converter stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum time to wait for the converter to complete.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

/// How a converter invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
}

impl ConvertOutput {
    pub fn succeeded() -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            timed_out: false,
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            timed_out: false,
        }
    }
}

/// Abstraction over conversion backends.
///
/// Non-zero exits and timeouts are reported in [`ConvertOutput`]; `Err` means
/// the converter could not be run at all.
pub trait Converter {
    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput>;
}

/// Converter that spawns a configured command in the subdirectory.
#[derive(Debug, Clone)]
pub struct ProcessConverter {
    argv: Vec<String>,
}

impl ProcessConverter {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(anyhow!("converter command must be a non-empty array"));
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

impl Converter for ProcessConverter {
    #[instrument(skip_all, fields(program = %self.program(), timeout_secs = request.timeout.as_secs()))]
    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput> {
        info!(workdir = %request.workdir.display(), "starting converter");

        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]).current_dir(&request.workdir);

        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {}", self.program()))?;

        write_converter_log(&request.log_path, &output)?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "converter timed out"
            );
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "converter failed");
        } else {
            debug!("converter completed successfully");
        }

        Ok(ConvertOutput {
            exit_code: output.status.code(),
            success: output.status.success() && !output.timed_out,
            timed_out: output.timed_out,
        })
    }
}

fn write_converter_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create converter log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("converter"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("converter"));
    if output.timed_out {
        buf.push_str("\n[converter timed out]\n");
    }
    if output.pipes_abandoned {
        buf.push_str("\n[output pipes held open by leftover processes]\n");
    }
    fs::write(path, buf).with_context(|| format!("write converter log {}", path.display()))
}
