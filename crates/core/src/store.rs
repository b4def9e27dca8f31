// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML-backed rule store.
//!
//! The store file is written by the CLI and read by the daemon; the
//! daemon re-reads it when the file's mtime changes. The document is
//! JSON-compatible YAML.

use crate::config::{ConfigError, RuleConfig};
use crate::rule::Rule;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Errors loading or persisting the rule store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rule store is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("rule #{0} does not exist")]
    NoSuchRule(u64),
}

/// File-backed store for the rule set.
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the rule set. A missing or empty file is an
    /// empty rule set.
    pub fn load(&self) -> Result<RuleConfig, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RuleConfig::default())
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(RuleConfig::default());
        }
        let config: RuleConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &RuleConfig) -> Result<(), StoreError> {
        config.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(config)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Append a rule and persist. The rule's id must not collide.
    pub fn add_rule(&self, rule: Rule) -> Result<Rule, StoreError> {
        let mut config = self.load()?;
        if config.rules.iter().any(|r| r.id == rule.id) {
            return Err(ConfigError::DuplicateRuleId(rule.id).into());
        }
        config.rules.push(rule.clone());
        config.rules.sort_by_key(|r| r.id);
        self.save(&config)?;
        Ok(rule)
    }

    /// Remove a rule by id and persist. Returns whether it existed.
    pub fn remove_rule(&self, rule_id: u64) -> Result<bool, StoreError> {
        let mut config = self.load()?;
        let before = config.rules.len();
        config.rules.retain(|r| r.id != rule_id);
        if config.rules.len() == before {
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }

    /// Last modification time of the store file, if it exists. The
    /// daemon polls this to pick up CLI edits mid-run.
    pub fn mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
