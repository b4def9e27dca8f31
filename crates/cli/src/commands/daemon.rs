// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kicker daemon` - daemon lifecycle commands.

use crate::daemon_control::{self, StopOptions};
use crate::exit_error::ExitError;
use anyhow::Result;
use clap::Subcommand;
use kicker_core::{paths, SystemClock};
use kicker_daemon::{local_hostname, DaemonOpts, LeaseStore};
use std::sync::Arc;

#[derive(Debug, clap::Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Run the daemon loop in the foreground
    Run(DaemonOpts),
    /// Show daemon leader metadata and liveness
    Status,
    /// Stop the active daemon for this state directory
    Stop {
        /// Escalate to SIGKILL if the daemon ignores SIGTERM
        #[arg(long)]
        force: bool,
        /// Return success when no daemon is running
        #[arg(long)]
        quiet: bool,
    },
}

pub async fn daemon(args: DaemonArgs) -> Result<()> {
    match args.command {
        DaemonCommand::Run(opts) => run(opts).await,
        DaemonCommand::Status => status(),
        DaemonCommand::Stop { force, quiet } => stop(force, quiet),
    }
}

async fn run(opts: DaemonOpts) -> Result<()> {
    setup_logging(opts.verbose);
    let quiet = opts.quiet;
    let summary = kicker_daemon::opts::run(opts).await?;
    if !summary.message.is_empty() && !(quiet && summary.exit_code == 0) {
        println!("{}", summary.message);
    }
    if summary.exit_code != 0 {
        return Err(ExitError::new(summary.exit_code).into());
    }
    Ok(())
}

fn status() -> Result<()> {
    let state_dir = paths::state_dir()?;
    let lease = LeaseStore::new(state_dir, 30.0, 10.0, Arc::new(SystemClock));

    let meta = match lease.read() {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            println!("No daemon metadata found.");
            return Err(ExitError::new(1).into());
        }
        Err(e) => anyhow::bail!("Invalid daemon metadata: {e}"),
    };

    let local = meta.hostname == local_hostname();
    let alive = local && daemon_control::process_exists(meta.pid);
    println!(
        "host={} pid={} local={} alive={}",
        meta.hostname, meta.pid, local, alive
    );
    println!("lease_expires_at={:.3}", meta.lease_expires_at);

    if local && alive {
        Ok(())
    } else {
        Err(ExitError::new(1).into())
    }
}

fn stop(force: bool, quiet: bool) -> Result<()> {
    let state_dir = paths::state_dir()?;
    let outcome = daemon_control::stop_active_daemon(&state_dir, StopOptions { force, quiet });
    if !outcome.message.is_empty() && !(quiet && outcome.exit_code == 0) {
        println!("{}", outcome.message);
    }
    if outcome.exit_code != 0 {
        return Err(ExitError::new(outcome.exit_code).into());
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
}
