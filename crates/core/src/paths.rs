// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem layout resolution.
//!
//! Config lives under `~/.config/kicker/`, mutable state under
//! `~/.local/state/kicker/`. `KICKER_CONFIG_DIR` and `KICKER_STATE_DIR`
//! override the whole directory (used by tests and by multi-home
//! setups); the XDG variables override just the base.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("HOME is not set and no directory override is provided")]
    NoHome,
}

fn home_path() -> Result<PathBuf, PathsError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| PathsError::NoHome)
}

/// The invoking user's home directory. Scripts run with this as their
/// working directory.
pub fn home_dir() -> Result<PathBuf, PathsError> {
    home_path()
}

/// Resolve config dir: `KICKER_CONFIG_DIR` > `XDG_CONFIG_HOME/kicker` >
/// `~/.config/kicker`.
pub fn config_dir() -> Result<PathBuf, PathsError> {
    if let Ok(dir) = std::env::var("KICKER_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("kicker"));
    }
    Ok(home_path()?.join(".config/kicker"))
}

/// Resolve state dir: `KICKER_STATE_DIR` > `XDG_STATE_HOME/kicker` >
/// `~/.local/state/kicker`.
pub fn state_dir() -> Result<PathBuf, PathsError> {
    if let Ok(dir) = std::env::var("KICKER_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("kicker"));
    }
    Ok(home_path()?.join(".local/state/kicker"))
}

/// Directory searched when a rule command's bare first word names a
/// script.
pub fn scripts_dir() -> Result<PathBuf, PathsError> {
    Ok(config_dir()?.join("scripts"))
}

pub fn config_file() -> Result<PathBuf, PathsError> {
    Ok(config_dir()?.join("config.yaml"))
}

pub fn runtime_state_file() -> Result<PathBuf, PathsError> {
    Ok(state_dir()?.join("runtime_state.json"))
}

pub fn checks_log_file() -> Result<PathBuf, PathsError> {
    Ok(state_dir()?.join("kicker_checks.log"))
}

pub fn actions_log_file() -> Result<PathBuf, PathsError> {
    Ok(state_dir()?.join("kicker_actions.log"))
}
