// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only check/action logs with size-capped, hourly-bounded trims.

use chrono::{DateTime, Local, SecondsFormat};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Trim is considered once the log reaches this size.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Minimum spacing between trims of one log.
pub const TRIM_COOLDOWN_SECONDS: f64 = 3600.0;

/// Rendering format for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One header line per record plus indented stdout/stderr blocks.
    PlainText,
    /// One JSON object per line (NDJSON).
    Json,
}

/// Which half of a pass a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Action,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Action => "action",
        }
    }
}

/// One check or action execution to be logged.
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub timestamp_unix: f64,
    pub rule_id: u64,
    pub script: &'a str,
    pub phase: Phase,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub stdout_truncated: u64,
    pub stderr_truncated: u64,
    pub timed_out: bool,
}

/// Append-only writer for one log stream (checks or actions).
///
/// Write errors are retried once and then dropped, never propagated:
/// a full disk must not stop the event loop.
pub struct LogWriter {
    path: PathBuf,
    format: LogFormat,
    dropped_records: u64,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>, format: LogFormat) -> Self {
        Self {
            path: path.into(),
            format,
            dropped_records: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records dropped after a failed retry.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    /// Append one record, trimming first if the log is over its size cap.
    pub fn append(&mut self, record: &LogRecord<'_>) {
        self.trim_if_needed(record.timestamp_unix);
        let text = match self.format {
            LogFormat::PlainText => render_plain(record),
            LogFormat::Json => render_json(record),
        };
        self.write(&text);
    }

    /// Append a marker for a fire suppressed by the rate limiter.
    pub fn append_throttled(&mut self, timestamp_unix: f64, rule_id: u64, script: &str) {
        self.trim_if_needed(timestamp_unix);
        let text = match self.format {
            LogFormat::PlainText => format!(
                "{} rule={} script={} phase=action throttled=true\n",
                iso_timestamp(timestamp_unix),
                rule_id,
                script,
            ),
            LogFormat::Json => {
                let mut line = serde_json::json!({
                    "timestamp": iso_timestamp(timestamp_unix),
                    "rule_id": rule_id,
                    "script": script,
                    "phase": "action",
                    "throttled": true,
                })
                .to_string();
                line.push('\n');
                line
            }
        };
        self.write(&text);
    }

    fn write(&mut self, text: &str) {
        if self.try_write(text).is_ok() {
            return;
        }
        // One retry, then drop the record rather than stall the loop.
        if let Err(e) = self.try_write(text) {
            self.dropped_records += 1;
            warn!(
                path = %self.path.display(),
                error = %e,
                dropped = self.dropped_records,
                "dropping log record after failed retry"
            );
        }
    }

    fn try_write(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())
    }

    fn trim_marker_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".trim");
        self.path.with_file_name(name)
    }

    fn last_trim_at(&self) -> f64 {
        fs::read_to_string(self.trim_marker_path())
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0.0)
    }

    /// Trim to the trailing half at a record boundary, at most once an
    /// hour. The marker file persists the bound across restarts.
    fn trim_if_needed(&self, now_unix: f64) {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < MAX_LOG_BYTES {
            return;
        }
        if now_unix - self.last_trim_at() < TRIM_COOLDOWN_SECONDS {
            return;
        }

        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "log trim read failed");
                return;
            }
        };
        let tail = &content[content.len() / 2..];
        let keep = match self.format {
            LogFormat::Json => next_line_start(tail),
            LogFormat::PlainText => next_header_start(tail),
        };
        if let Err(e) = fs::write(&self.path, &tail[keep..]) {
            warn!(path = %self.path.display(), error = %e, "log trim write failed");
            return;
        }
        if let Err(e) = fs::write(self.trim_marker_path(), format!("{now_unix}\n")) {
            warn!(path = %self.path.display(), error = %e, "trim marker write failed");
        }
    }
}

/// Offset of the first complete line in `tail`.
fn next_line_start(tail: &[u8]) -> usize {
    tail.iter()
        .position(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Offset of the first plain-text header line in `tail`. Header lines
/// are unindented; continuation lines start with two spaces.
fn next_header_start(tail: &[u8]) -> usize {
    let mut at = 0;
    loop {
        match tail[at..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let start = at + i + 1;
                if start >= tail.len() {
                    return 0;
                }
                if tail[start] != b' ' {
                    return start;
                }
                at = start;
            }
            None => return 0,
        }
    }
}

fn render_plain(record: &LogRecord<'_>) -> String {
    let mut out = format!(
        "{} rule={} script={} phase={} exit={} duration_ms={} timed_out={}\n",
        iso_timestamp(record.timestamp_unix),
        record.rule_id,
        record.script,
        record.phase.as_str(),
        record.exit_code,
        record.duration_ms,
        record.timed_out,
    );
    for line in record.stdout.lines() {
        out.push_str("  stdout| ");
        out.push_str(line);
        out.push('\n');
    }
    if record.stdout_truncated > 0 {
        out.push_str(&format!(
            "  stdout| [truncated {} bytes]\n",
            record.stdout_truncated
        ));
    }
    for line in record.stderr.lines() {
        out.push_str("  stderr| ");
        out.push_str(line);
        out.push('\n');
    }
    if record.stderr_truncated > 0 {
        out.push_str(&format!(
            "  stderr| [truncated {} bytes]\n",
            record.stderr_truncated
        ));
    }
    out
}

fn render_json(record: &LogRecord<'_>) -> String {
    let mut line = serde_json::json!({
        "timestamp": iso_timestamp(record.timestamp_unix),
        "rule_id": record.rule_id,
        "script": record.script,
        "phase": record.phase.as_str(),
        "exit_code": record.exit_code,
        "duration_ms": record.duration_ms,
        "stdout": record.stdout,
        "stderr": record.stderr,
        "stdout_truncated": record.stdout_truncated,
        "stderr_truncated": record.stderr_truncated,
        "timed_out": record.timed_out,
    })
    .to_string();
    line.push('\n');
    line
}

/// ISO-8601 wall-clock timestamp with the local offset.
fn iso_timestamp(unix: f64) -> String {
    let secs = unix.floor() as i64;
    let nanos = ((unix - unix.floor()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| {
            dt.with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Millis, false)
        })
        .unwrap_or_else(|| format!("{unix}"))
}

#[cfg(test)]
#[path = "log_writer_tests.rs"]
mod tests;
