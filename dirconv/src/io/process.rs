//! Running converter processes with a hard timeout and bounded output capture.
//!
//! On unix the child is placed in its own process group, so a timeout kills
//! everything the converter started, not just the direct child. Pipe readers
//! are never joined unconditionally: output is collected into shared buffers
//! and whatever was read by the deadline is returned.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long readers may keep draining after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// Some pipe was still held open (by a leftover descendant) when capture ended.
    pub pipes_abandoned: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stdout", self.stdout_truncated)
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stderr", self.stderr_truncated)
    }
}

fn truncated_notice(label: &str, stream: &str, bytes: usize) -> String {
    if bytes > 0 {
        format!("\n[{label} {stream} truncated {bytes} bytes]\n")
    } else {
        String::new()
    }
}

/// Bytes kept from one stream plus the count of bytes dropped past the limit.
#[derive(Debug, Default)]
struct Capture {
    kept: Vec<u8>,
    dropped: usize,
}

impl Capture {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.kept.len());
        let keep = chunk.len().min(room);
        self.kept.extend_from_slice(&chunk[..keep]);
        self.dropped += chunk.len() - keep;
    }
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Run `cmd` with stdin closed, killing its whole process tree after `timeout`.
///
/// `output_limit_bytes` bounds what is kept per stream; the pipes are still
/// drained past it so the child never blocks on a full pipe. If the child
/// exits but a descendant keeps the pipes open, capture stops at the deadline
/// and the leftover processes are killed.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes = output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let deadline = Instant::now() + timeout;
    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let (done_tx, done_rx) = mpsc::channel();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_capture = spawn_reader(stdout, output_limit_bytes, done_tx.clone());
    let stderr_capture = spawn_reader(stderr, output_limit_bytes, done_tx);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing process group"
            );
            timed_out = true;
            kill_tree(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let drain_until = if timed_out {
        Instant::now() + DRAIN_GRACE
    } else {
        deadline.max(Instant::now()) + DRAIN_GRACE
    };
    let mut pipes_abandoned = !wait_readers(&done_rx, 2, drain_until);
    if pipes_abandoned && !timed_out {
        warn!("command exited but its pipes are still open, killing leftover processes");
        kill_group(child.id());
        pipes_abandoned = !wait_readers(&done_rx, 2, Instant::now() + DRAIN_GRACE);
    }
    if pipes_abandoned {
        warn!("giving up on output pipes held by leftover processes");
    }

    let (stdout, stdout_truncated) = take_capture(&stdout_capture)?;
    let (stderr, stderr_truncated) = take_capture(&stderr_capture)?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        pipes_abandoned,
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    limit: usize,
    done: Sender<()>,
) -> SharedCapture {
    let capture = SharedCapture::default();
    let sink = Arc::clone(&capture);
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => match sink.lock() {
                    Ok(mut capture) => capture.push(&chunk[..n], limit),
                    Err(_) => break,
                },
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(err = %err, "failed to read command output");
                    break;
                }
            }
        }
        // The receiver is gone once capture was abandoned.
        let _ = done.send(());
    });
    capture
}

/// Wait until `count` readers report completion; false if `until` passes first.
fn wait_readers(done: &Receiver<()>, count: usize, until: Instant) -> bool {
    for _ in 0..count {
        let remaining = until.saturating_duration_since(Instant::now());
        match done.recv_timeout(remaining) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => return false,
            // Every sender dropped means every reader finished.
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
    true
}

fn take_capture(capture: &SharedCapture) -> Result<(Vec<u8>, usize)> {
    let mut capture = capture
        .lock()
        .map_err(|_| anyhow!("output buffer lock poisoned"))?;
    let taken = std::mem::take(&mut *capture);
    Ok((taken.kept, taken.dropped))
}

fn kill_tree(child: &mut Child) -> Result<()> {
    kill_group(child.id());
    child.kill().context("kill command")
}

/// Signal every process in the group led by `pgid`.
///
/// Shells out to `kill(1)` since the workspace forbids `unsafe`; failures only
/// mean the group is already gone or cannot be signalled, and the direct child
/// is killed separately either way.
#[cfg(unix)]
fn kill_group(pgid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pgid, "killed process group"),
        Ok(status) => debug!(pgid, code = ?status.code(), "process group kill reported failure"),
        Err(err) => warn!(pgid, err = %err, "could not run kill for process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
