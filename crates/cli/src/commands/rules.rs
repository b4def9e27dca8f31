// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kicker add` / `list` / `remove` / `stats` - rule management.

use crate::exit_error::ExitError;
use anyhow::{bail, Result};
use kicker_core::{parse_rate_limit, paths, Clock, Rule, RuleStore, RuntimeStateStore, SystemClock, Trigger};

#[derive(Debug, clap::Args)]
pub struct AddArgs {
    /// Action command to run when the trigger fires
    pub action: String,

    /// Run action when check returns non-zero
    #[arg(long = "if", value_name = "CHECK")]
    pub if_nonzero: Option<String>,

    /// Run action when check returns zero
    #[arg(long = "if-zero", value_name = "CHECK")]
    pub if_zero: Option<String>,

    /// Run action when check transitions non-zero -> zero
    #[arg(long = "if-fail-to-pass", value_name = "CHECK")]
    pub if_fail_to_pass: Option<String>,

    /// Run action when check transitions zero -> non-zero
    #[arg(long = "if-pass-to-fail", value_name = "CHECK")]
    pub if_pass_to_fail: Option<String>,

    /// Run action when check returns this exit code
    #[arg(long = "if-code", value_name = "N")]
    pub if_code: Option<i32>,

    /// Check command (required with --if-code)
    #[arg(long, value_name = "CHECK")]
    pub check: Option<String>,

    /// Remove the rule after its first action dispatch
    #[arg(long)]
    pub once: bool,

    /// Per-rule polling interval in seconds
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Per-rule action rate limit in count/seconds format (example: 2/60)
    #[arg(long, value_name = "N/SECONDS")]
    pub rate_limit: Option<String>,

    /// Per-rule check/action timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,
}

/// Bad-usage error: print and exit 2, matching clap's own convention.
fn usage_error(msg: &str) -> anyhow::Error {
    eprintln!("Error: {msg}");
    ExitError::new(2).into()
}

/// Pick exactly one trigger selector from the flags. Returns the
/// trigger, the check command, and the human-readable reconstruction
/// stored for `kicker list`.
fn resolve_trigger(args: &AddArgs) -> Result<(Trigger, String, String)> {
    let mut chosen: Vec<(Trigger, String, String)> = Vec::new();

    if let Some(check) = &args.if_nonzero {
        chosen.push((Trigger::OnNonzero, check.clone(), format!("--if {check}")));
    }
    if let Some(check) = &args.if_zero {
        chosen.push((Trigger::OnZero, check.clone(), format!("--if-zero {check}")));
    }
    if let Some(check) = &args.if_fail_to_pass {
        chosen.push((
            Trigger::OnFailToPass,
            check.clone(),
            format!("--if-fail-to-pass {check}"),
        ));
    }
    if let Some(check) = &args.if_pass_to_fail {
        chosen.push((
            Trigger::OnPassToFail,
            check.clone(),
            format!("--if-pass-to-fail {check}"),
        ));
    }
    if let Some(n) = args.if_code {
        let Some(check) = &args.check else {
            return Err(usage_error("--check is required with --if-code"));
        };
        chosen.push((
            Trigger::OnCode { n },
            check.clone(),
            format!("--if-code {n} --check {check}"),
        ));
    }

    if chosen.len() != 1 {
        return Err(usage_error(
            "specify exactly one trigger: --if / --if-zero / --if-fail-to-pass / \
             --if-pass-to-fail / --if-code + --check",
        ));
    }
    Ok(chosen.remove(0))
}

fn default_store() -> Result<RuleStore> {
    Ok(RuleStore::new(paths::config_file()?))
}

pub fn add(args: AddArgs) -> Result<()> {
    let (trigger, check, original_spec) = resolve_trigger(&args)?;

    if matches!(args.interval, Some(interval) if !(interval > 0.0)) {
        return Err(usage_error("--interval must be > 0"));
    }
    if matches!(args.timeout, Some(timeout) if !(timeout > 0.0)) {
        return Err(usage_error("--timeout must be > 0"));
    }
    let rate_limit = match &args.rate_limit {
        Some(text) => Some(parse_rate_limit(text).map_err(|e| usage_error(&e.to_string()))?),
        None => None,
    };

    let store = default_store()?;
    let config = store.load()?;
    let rule = Rule {
        id: config.next_rule_id(),
        check,
        action: args.action,
        trigger,
        once: args.once,
        poll_interval: args.interval,
        rate_limit,
        timeout: args.timeout,
        original_spec,
    };
    rule.validate().map_err(|e| usage_error(&e.to_string()))?;

    let rule = store.add_rule(rule)?;
    println!("Added rule #{}", rule.id);
    Ok(())
}

pub fn list() -> Result<()> {
    let store = default_store()?;
    let config = store.load()?;

    if config.rules.is_empty() {
        println!("No rules configured.");
        return Ok(());
    }

    println!("default_poll_interval={}s", config.default_poll_interval);
    let mut rules = config.rules.clone();
    rules.sort_by_key(|r| r.id);
    for rule in &rules {
        println!("{}", format_rule_line(rule, config.default_poll_interval));
    }
    Ok(())
}

fn format_rule_line(rule: &Rule, default_poll_interval: f64) -> String {
    let poll = rule.effective_poll_interval(default_poll_interval);
    let rate = rule.effective_rate_limit(default_poll_interval);
    let timeout = rule.effective_timeout(default_poll_interval);
    format!(
        "#{} trigger={} interval={}s rate={} timeout={}s check={:?} action={:?} spec={:?}",
        rule.id, rule.trigger, poll, rate, timeout, rule.check, rule.action, rule.original_spec,
    )
}

pub fn remove(rule_id: u64) -> Result<()> {
    let store = default_store()?;
    if !store.remove_rule(rule_id)? {
        bail!("Rule #{rule_id} does not exist");
    }
    println!("Removed rule #{rule_id}");
    Ok(())
}

pub fn stats() -> Result<()> {
    let store = default_store()?;
    let config = store.load()?;
    if config.rules.is_empty() {
        println!("No rules configured.");
        return Ok(());
    }

    let state = RuntimeStateStore::new(paths::runtime_state_file()?)
        .load()
        .unwrap_or_default();
    let now = SystemClock.now_unix();

    let mut rules = config.rules.clone();
    rules.sort_by_key(|r| r.id);
    for rule in &rules {
        let default = kicker_core::RuleRuntimeState::default();
        let rule_state = state.rules.get(&rule.id).unwrap_or(&default);
        println!(
            "#{} trigger={} checks={} actions={} actions_last_24h={}",
            rule.id,
            rule.trigger,
            rule_state.checks,
            rule_state.actions,
            rule_state.actions_last_24h(now),
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
