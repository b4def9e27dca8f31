// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule model: the unit of automation.
//!
//! A rule pairs a check command with an action command and a trigger
//! predicate over the check's exit codes. Ids are assigned by the rule
//! store, monotonically, and never reused.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Predicate over (previous, current) check exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire when the check exits 0.
    OnZero,
    /// Fire when the check exits non-zero.
    OnNonzero,
    /// Fire on a non-zero -> zero transition. Never fires on the first
    /// evaluation.
    #[serde(rename = "on_transition_fail_to_pass")]
    OnFailToPass,
    /// Fire on a zero -> non-zero transition. Never fires on the first
    /// evaluation.
    #[serde(rename = "on_transition_pass_to_fail")]
    OnPassToFail,
    /// Fire when the check exits exactly `n`. `n` is honored literally,
    /// including `n = 0`.
    #[serde(rename = "on_code_n")]
    OnCode { n: i32 },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnZero => f.write_str("on_zero"),
            Self::OnNonzero => f.write_str("on_nonzero"),
            Self::OnFailToPass => f.write_str("on_transition_fail_to_pass"),
            Self::OnPassToFail => f.write_str("on_transition_pass_to_fail"),
            Self::OnCode { n } => write!(f, "on_code_n({n})"),
        }
    }
}

/// Per-rule action rate limit: at most `count` actions per `window_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub count: u32,
    pub window_seconds: f64,
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.window_seconds)
    }
}

/// A trigger/action rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u64,
    #[serde(rename = "check_script")]
    pub check: String,
    #[serde(rename = "action_script")]
    pub action: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub once: bool,
    /// Polling interval in seconds; `None` inherits the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    /// Timeout in seconds for both check and action; `None` derives from
    /// the effective polling interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Human-readable reconstruction of the trigger, for listing.
    #[serde(default)]
    pub original_spec: String,
}

/// Rule validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule id must be positive")]
    InvalidId,
    #[error("check command must not be empty")]
    EmptyCheck,
    #[error("action command must not be empty")]
    EmptyAction,
    #[error("poll interval must be > 0")]
    InvalidPollInterval,
    #[error("timeout must be > 0")]
    InvalidTimeout,
    #[error("rate limit must be in count/seconds format with both parts > 0")]
    InvalidRateLimit,
}

impl Rule {
    /// Check structural invariants. Called by the store on load and by
    /// the CLI before persisting.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id == 0 {
            return Err(RuleError::InvalidId);
        }
        if self.check.trim().is_empty() {
            return Err(RuleError::EmptyCheck);
        }
        if self.action.trim().is_empty() {
            return Err(RuleError::EmptyAction);
        }
        if let Some(interval) = self.poll_interval {
            if !(interval > 0.0) {
                return Err(RuleError::InvalidPollInterval);
            }
        }
        if let Some(timeout) = self.timeout {
            if !(timeout > 0.0) {
                return Err(RuleError::InvalidTimeout);
            }
        }
        if let Some(limit) = self.rate_limit {
            if limit.count == 0 || !(limit.window_seconds > 0.0) {
                return Err(RuleError::InvalidRateLimit);
            }
        }
        Ok(())
    }

    /// The polling interval this rule runs at, given the global default.
    pub fn effective_poll_interval(&self, default_poll_interval: f64) -> f64 {
        self.poll_interval.unwrap_or(default_poll_interval)
    }

    /// Timeout for both check and action. Defaults to 90% of the
    /// effective polling interval so a hung script cannot pile up passes.
    pub fn effective_timeout(&self, default_poll_interval: f64) -> f64 {
        match self.timeout {
            Some(timeout) => timeout,
            None => self.effective_poll_interval(default_poll_interval) * 0.9,
        }
    }

    /// Rate limit for action dispatch. Defaults to one action per
    /// effective polling interval.
    pub fn effective_rate_limit(&self, default_poll_interval: f64) -> RateLimit {
        self.rate_limit.unwrap_or(RateLimit {
            count: 1,
            window_seconds: self.effective_poll_interval(default_poll_interval),
        })
    }
}

/// Parse a `count/window_seconds` rate limit such as `2/60`.
pub fn parse_rate_limit(text: &str) -> Result<RateLimit, RuleError> {
    let (count, seconds) = text
        .trim()
        .split_once('/')
        .ok_or(RuleError::InvalidRateLimit)?;
    let count: u32 = count.parse().map_err(|_| RuleError::InvalidRateLimit)?;
    let window_seconds: f64 = seconds.parse().map_err(|_| RuleError::InvalidRateLimit)?;
    let limit = RateLimit {
        count,
        window_seconds,
    };
    if count == 0 || !(window_seconds > 0.0) {
        return Err(RuleError::InvalidRateLimit);
    }
    Ok(limit)
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
