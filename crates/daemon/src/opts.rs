// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon CLI flags, shared by `kickerd` and `kicker daemon run`.

use crate::log_writer::LogFormat;
use crate::runner::ShellRunner;
use crate::supervisor::{RunSummary, Supervisor, SupervisorConfig, SupervisorError};
use kicker_core::{paths, SystemClock};
use std::sync::Arc;

/// Supervisor-owned flags.
#[derive(Debug, Clone, clap::Args)]
pub struct DaemonOpts {
    /// Log format for check/action records.
    #[arg(long, value_enum, default_value_t = LogFormat::PlainText)]
    pub log_format: LogFormat,

    /// Override the global default polling interval in seconds.
    /// Per-rule intervals still win.
    #[arg(long)]
    pub poll_interval: Option<f64>,

    /// Leader lease duration in seconds.
    #[arg(long)]
    pub lease_seconds: Option<f64>,

    /// Grace period after lease expiry before takeover is allowed.
    #[arg(long, default_value_t = 10.0)]
    pub lease_grace_seconds: f64,

    /// Suppress duplicate-instance noise; exit 0 when another daemon
    /// holds the lease.
    #[arg(long)]
    pub quiet: bool,

    /// Emit lifecycle and per-rule debug output to stdout.
    #[arg(long)]
    pub verbose: bool,
}

/// Build and run a supervisor from CLI flags against the user's real
/// config and state directories.
pub async fn run(opts: DaemonOpts) -> Result<RunSummary, SupervisorError> {
    let state_dir = paths::state_dir().map_err(io_invalid)?;
    let config_path = paths::config_file().map_err(io_invalid)?;
    let home_dir = paths::home_dir().map_err(io_invalid)?;
    let scripts_dir = paths::scripts_dir().map_err(io_invalid)?;

    let supervisor = Supervisor::new(
        SupervisorConfig {
            state_dir,
            config_path,
            log_format: opts.log_format,
            default_poll_interval: opts.poll_interval,
            lease_seconds: opts.lease_seconds,
            lease_grace_seconds: opts.lease_grace_seconds,
            quiet: opts.quiet,
            max_passes: None,
        },
        Arc::new(SystemClock),
        Arc::new(ShellRunner::new(home_dir, scripts_dir)),
    );
    supervisor.run().await
}

fn io_invalid(e: kicker_core::paths::PathsError) -> SupervisorError {
    SupervisorError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        e.to_string(),
    ))
}
