// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kicker - per-user check/action automation CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod daemon_control;
mod exit_error;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::exit_error::ExitError;

#[derive(Parser)]
#[command(
    name = "kicker",
    version,
    about = "kicker - run action scripts when check scripts' exit codes match"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a trigger/action rule
    Add(commands::rules::AddArgs),
    /// List configured rules
    List,
    /// Remove a rule by id
    Remove {
        /// Rule id, as shown by `kicker list`
        rule_id: u64,
    },
    /// Show per-rule execution statistics
    Stats,
    /// Manage the kickerd daemon
    Daemon(commands::daemon::DaemonArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        let code = e.downcast_ref::<ExitError>().map_or(1, |exit| exit.code);
        let msg = e.to_string();
        if !msg.is_empty() {
            eprintln!("Error: {msg}");
        }
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Add(args) => commands::rules::add(args),
        Commands::List => commands::rules::list(),
        Commands::Remove { rule_id } => commands::rules::remove(rule_id),
        Commands::Stats => commands::rules::stats(),
        Commands::Daemon(args) => commands::daemon::daemon(args).await,
    }
}
