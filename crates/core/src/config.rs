// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule set document: global defaults plus the rule list.

use crate::rule::{Rule, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Supported rule store document version.
pub const CONFIG_VERSION: u32 = 1;

/// Global default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL: f64 = 60.0;

/// The persisted rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub version: u32,
    pub default_poll_interval: f64,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            rules: Vec::new(),
        }
    }
}

/// Rule set document validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),
    #[error("default_poll_interval must be > 0")]
    InvalidDefaultPollInterval,
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(u64),
    #[error("rule #{id}: {source}")]
    InvalidRule { id: u64, source: RuleError },
}

impl RuleConfig {
    /// Validate the document: version, global default, unique ids, and
    /// every rule's own invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        if !(self.default_poll_interval > 0.0) {
            return Err(ConfigError::InvalidDefaultPollInterval);
        }
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id) {
                return Err(ConfigError::DuplicateRuleId(rule.id));
            }
            rule.validate().map_err(|source| ConfigError::InvalidRule {
                id: rule.id,
                source,
            })?;
        }
        Ok(())
    }

    /// Next id to assign: one past the highest ever stored here.
    /// Deleting a rule does not renumber the others.
    pub fn next_rule_id(&self) -> u64 {
        self.rules.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    pub fn rule(&self, id: u64) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
