// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kickerd — the kicker daemon, run in the foreground.
//!
//! A single instance per state directory is enforced by the leader
//! lease; a second start exits 1 (or 0 with --quiet) without side
//! effects.

use clap::Parser;
use kicker_daemon::opts::{self, DaemonOpts};

#[derive(Parser)]
#[command(
    name = "kickerd",
    version,
    about = "kicker daemon - polls check scripts and fires actions on matching exit codes"
)]
struct Cli {
    #[command(flatten)]
    opts: DaemonOpts,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.opts.verbose);

    match opts::run(cli.opts.clone()).await {
        Ok(summary) => {
            if !summary.message.is_empty() && !(cli.opts.quiet && summary.exit_code == 0) {
                println!("{}", summary.message);
            }
            std::process::exit(summary.exit_code);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
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
