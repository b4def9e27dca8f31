// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-rule runtime state and its JSON store.
//!
//! Runtime state is created on first observation of a rule and dropped
//! when the rule is removed. It is persisted across daemon restarts so
//! `kicker stats` and transition triggers survive a restart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sliding window for the `actions_last_24h` counter.
const DAY_SECONDS: f64 = 86_400.0;

/// Mutable per-rule state for one daemon lifetime (and across restarts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleRuntimeState {
    /// Exit code of the last completed check; `None` before the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_exit: Option<i32>,
    /// Wall-clock time of the last completed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<f64>,
    /// Action fire timestamps within the current rate window.
    #[serde(default)]
    pub recent_fires: Vec<f64>,
    /// Action fire timestamps within the last 24 hours.
    #[serde(default)]
    pub fires_24h: Vec<f64>,
    /// Total checks executed.
    #[serde(default)]
    pub checks: u64,
    /// Total actions executed.
    #[serde(default)]
    pub actions: u64,
}

impl RuleRuntimeState {
    /// Record a completed check.
    pub fn record_check(&mut self, exit_code: i32, now: f64) {
        self.prev_exit = Some(exit_code);
        self.last_check_at = Some(now);
        self.checks += 1;
    }

    /// Record a dispatched action and prune the 24-hour window.
    pub fn record_action(&mut self, now: f64) {
        self.actions += 1;
        self.fires_24h.push(now);
        self.fires_24h.retain(|&t| now - t < DAY_SECONDS);
    }

    /// Actions fired within the sliding 24-hour window ending at `now`.
    pub fn actions_last_24h(&self, now: f64) -> usize {
        self.fires_24h
            .iter()
            .filter(|&&t| now - t < DAY_SECONDS)
            .count()
    }
}

/// Runtime state for all rules, keyed by rule id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(default)]
    pub rules: BTreeMap<u64, RuleRuntimeState>,
}

impl RuntimeState {
    /// State for a rule, created on first observation.
    pub fn get_or_insert(&mut self, rule_id: u64) -> &mut RuleRuntimeState {
        self.rules.entry(rule_id).or_default()
    }

    /// Drop state for a removed rule.
    pub fn remove(&mut self, rule_id: u64) {
        self.rules.remove(&rule_id);
    }
}

/// Errors reading or writing the runtime state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("runtime state i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// JSON-backed store for [`RuntimeState`].
#[derive(Debug, Clone)]
pub struct RuntimeStateStore {
    path: PathBuf,
}

impl RuntimeStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state. A missing or empty file is an empty state.
    pub fn load(&self) -> Result<RuntimeState, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RuntimeState::default())
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(RuntimeState::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, state: &RuntimeState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = serde_json::to_string_pretty(state)?;
        text.push('\n');
        fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
