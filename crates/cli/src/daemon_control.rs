// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop contract against the daemon's leader metadata.
//!
//! The stop command targets the recorded pid only when the recorded
//! hostname matches this host; a daemon on another host sharing the
//! same home directory must be stopped there.

use kicker_core::SystemClock;
use kicker_daemon::{local_hostname, LeaseStore};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long to wait for SIGTERM to land before giving up (or
/// escalating with `--force`).
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Extra wait after a SIGKILL escalation.
const KILL_WAIT: Duration = Duration::from_secs(1);

/// Liveness poll spacing.
const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct StopOptions {
    pub force: bool,
    pub quiet: bool,
}

#[derive(Debug)]
pub struct StopOutcome {
    pub exit_code: i32,
    pub message: String,
}

impl StopOutcome {
    fn new(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }
}

/// Send a signal with `kill`; reports whether the signal was delivered.
fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Whether a process with this pid exists (signal 0 probe).
pub fn process_exists(pid: u32) -> bool {
    pid > 0 && kill_signal("-0", pid)
}

fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        std::thread::sleep(POLL);
    }
    !process_exists(pid)
}

/// Stop the daemon recorded in this state directory's leader metadata.
pub fn stop_active_daemon(state_dir: &Path, options: StopOptions) -> StopOutcome {
    stop_with_waits(state_dir, options, STOP_WAIT, KILL_WAIT)
}

/// Stop with explicit waits; tests shorten them.
pub fn stop_with_waits(
    state_dir: &Path,
    options: StopOptions,
    stop_wait: Duration,
    kill_wait: Duration,
) -> StopOutcome {
    let lease = LeaseStore::new(state_dir, 30.0, 10.0, Arc::new(SystemClock));
    let meta = match lease.read() {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            let code = if options.quiet { 0 } else { 1 };
            return StopOutcome::new(code, "No daemon is running.");
        }
        Err(e) => return StopOutcome::new(1, format!("Invalid daemon metadata: {e}")),
    };

    let current_host = local_hostname();
    if meta.hostname != current_host {
        return StopOutcome::new(
            1,
            format!(
                "Active daemon is on host '{}', current host is '{}'.",
                meta.hostname, current_host
            ),
        );
    }
    if meta.pid == 0 {
        return StopOutcome::new(1, format!("Invalid daemon pid in metadata: {}", meta.pid));
    }

    if !process_exists(meta.pid) {
        // Stale metadata from a crashed daemon; clear it.
        return match clear_metadata(state_dir) {
            Ok(()) => StopOutcome::new(0, "No daemon is running. Cleared stale metadata."),
            Err(e) => StopOutcome::new(1, format!("Failed to clear stale metadata: {e}")),
        };
    }

    kill_signal("-TERM", meta.pid);
    let mut stopped = wait_for_exit(meta.pid, stop_wait);

    if !stopped && options.force {
        kill_signal("-KILL", meta.pid);
        stopped = wait_for_exit(meta.pid, kill_wait);
    }

    if !stopped {
        return StopOutcome::new(
            1,
            format!("Failed to stop daemon pid {}. Retry with --force.", meta.pid),
        );
    }

    // A graceful exit releases the lease itself; clean up what remains
    // after a forced kill.
    if let Err(e) = clear_metadata(state_dir) {
        return StopOutcome::new(1, format!("Daemon stopped but failed to clear metadata: {e}"));
    }
    StopOutcome::new(0, format!("Stopped daemon pid {}.", meta.pid))
}

fn clear_metadata(state_dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(state_dir.join("leader.lock")) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "daemon_control_tests.rs"]
mod tests;
