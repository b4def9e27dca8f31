// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script execution with timeout, output capture, and group kill.

use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Exit code reported for timed-out scripts, by convention.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code synthesized when the shell itself cannot be spawned.
/// Missing scripts get the shell's own 127.
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Per-stream capture cap. Output past this is discarded and counted.
pub const OUTPUT_CAP_BYTES: usize = 1024 * 1024;

/// How long a timed-out process group gets between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Result of running one script.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Bytes discarded past the capture cap, per stream.
    pub stdout_truncated: u64,
    pub stderr_truncated: u64,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Seam between the scheduler and real child processes. The supervisor
/// is driven by a scripted implementation in tests.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome;
}

/// Runs commands through `/bin/sh -c` in their own process group.
///
/// The working directory is fixed (the invoking user's home) and the
/// parent environment is inherited. A bare first word naming a file in
/// the scripts directory is resolved to its absolute path.
pub struct ShellRunner {
    cwd: PathBuf,
    scripts_dir: PathBuf,
    output_cap: usize,
}

impl ShellRunner {
    pub fn new(cwd: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            scripts_dir: scripts_dir.into(),
            output_cap: OUTPUT_CAP_BYTES,
        }
    }

    /// Override the per-stream capture cap.
    pub fn output_cap(mut self, bytes: usize) -> Self {
        self.output_cap = bytes;
        self
    }

    /// Resolve a bare first word against the scripts directory.
    fn resolve(&self, command: &str) -> String {
        let Some(first) = command.split_whitespace().next() else {
            return command.to_string();
        };
        if first.contains('/') {
            return command.to_string();
        }
        let candidate = self.scripts_dir.join(first);
        if candidate.exists() {
            let rest = command.trim_start().strip_prefix(first).unwrap_or("");
            format!("{}{}", candidate.display(), rest)
        } else {
            command.to_string()
        }
    }
}

#[async_trait]
impl ScriptRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome {
        let resolved = self.resolve(command);
        let started = Instant::now();

        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&resolved)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %resolved, error = %e, "failed to spawn shell");
                return RunOutcome {
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    stderr: format!("failed to spawn shell: {e}"),
                    duration: started.elapsed(),
                    ..RunOutcome::default()
                };
            }
        };

        let pid = child.id();
        let cap = self.output_cap;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        // Drain both pipes concurrently with the wait so a chatty child
        // cannot deadlock on a full pipe.
        let stdout_task = tokio::spawn(read_capped(stdout_pipe, cap));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe, cap));

        let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                warn!(command = %resolved, error = %e, "wait failed");
                (None, false)
            }
            Err(_) => {
                if let Some(pid) = pid {
                    signal_group(pid, "-TERM");
                }
                if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
                    if let Some(pid) = pid {
                        signal_group(pid, "-KILL");
                    }
                    let _ = child.wait().await;
                }
                (None, true)
            }
        };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

        let exit_code = if timed_out {
            TIMEOUT_EXIT_CODE
        } else {
            match status {
                Some(status) => status
                    .code()
                    .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)),
                None => SPAWN_FAILURE_EXIT_CODE,
            }
        };

        let duration = started.elapsed();
        debug!(
            command = %resolved,
            exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "script finished"
        );

        RunOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_truncated,
            stderr_truncated,
            duration,
            timed_out,
        }
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes and counting the rest.
async fn read_capped<R>(pipe: Option<R>, cap: usize) -> (Vec<u8>, u64)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return (Vec::new(), 0);
    };
    let mut buf = Vec::new();
    let mut dropped: u64 = 0;
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(buf.len());
                let take = room.min(n);
                buf.extend_from_slice(&chunk[..take]);
                dropped += (n - take) as u64;
            }
            Err(_) => break,
        }
    }
    (buf, dropped)
}

/// Send a signal to a child's whole process group via `kill`.
fn signal_group(pid: u32, signal: &str) {
    let _ = std::process::Command::new("kill")
        .args([signal, "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Basename of a command's first word, for log records.
pub fn script_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or(command);
    std::path::Path::new(first)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| first.to_string())
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
