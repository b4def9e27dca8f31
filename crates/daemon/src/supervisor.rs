// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon supervisor: lease lifecycle, rule passes, graceful shutdown.
//!
//! Single-threaded cooperative event loop. All rule state lives on this
//! task; the only suspension points are the timer/signal wait and the
//! child-process wait inside a pass. While a child runs no other rule
//! advances, so a long-running rule delays only itself plus whatever
//! was already due behind it.

use crate::lease::{Claim, LeaseError, LeaseStore};
use crate::log_writer::{LogFormat, LogRecord, LogWriter, Phase};
use crate::runner::{script_name, ScriptRunner};
use crate::scheduler::RuleScheduler;
use kicker_core::{
    Clock, RateLimiter, Rule, RuleStore, RuntimeState, RuntimeStateStore, StoreError,
    trigger_matches,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

/// Upper bound on one event-loop wait, so external edits (store mtime)
/// are noticed promptly even when nothing is due.
const TICK: Duration = Duration::from_secs(1);

/// Supervisor wiring and tunables.
pub struct SupervisorConfig {
    /// State directory holding the lease, logs, and runtime state.
    pub state_dir: PathBuf,
    /// Path to the rule store document.
    pub config_path: PathBuf,
    pub log_format: LogFormat,
    /// Overrides the store's global default polling interval.
    pub default_poll_interval: Option<f64>,
    pub lease_seconds: Option<f64>,
    pub lease_grace_seconds: f64,
    pub quiet: bool,
    /// Stop after this many passes. Test hook; `None` in production.
    pub max_passes: Option<u64>,
}

/// How a daemon run ended.
#[derive(Debug)]
pub struct RunSummary {
    pub exit_code: i32,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one rule pass.
struct PassReport {
    check_exit: i32,
    fired: bool,
    throttled: bool,
}

/// The daemon core: acquires the lease, schedules rules, runs passes.
pub struct Supervisor {
    config: SupervisorConfig,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn ScriptRunner>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        clock: Arc<dyn Clock>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            config,
            clock,
            runner,
        }
    }

    /// Run to completion. `Ok` carries the process exit code; `Err` is a
    /// fatal startup or lease failure (exit non-zero).
    pub async fn run(self) -> Result<RunSummary, SupervisorError> {
        std::fs::create_dir_all(&self.config.state_dir)?;

        let store = RuleStore::new(&self.config.config_path);
        let rule_config = store.load()?;
        let mut default_poll = self
            .config
            .default_poll_interval
            .unwrap_or(rule_config.default_poll_interval);
        if !(default_poll > 0.0) {
            return Ok(RunSummary {
                exit_code: 1,
                message: "default polling interval must be > 0".to_string(),
            });
        }

        let lease_seconds = self
            .config
            .lease_seconds
            .unwrap_or_else(|| (default_poll * 2.0).max(30.0));
        let lease = LeaseStore::new(
            &self.config.state_dir,
            lease_seconds,
            self.config.lease_grace_seconds,
            Arc::clone(&self.clock),
        );

        match lease.try_acquire()? {
            Claim::Acquired => info!("acquired leader lease"),
            Claim::Stale(old) => info!(
                previous_host = %old.hostname,
                previous_pid = old.pid,
                "reclaimed stale leader lease"
            ),
            Claim::HeldBy(meta) => {
                return Ok(RunSummary {
                    exit_code: if self.config.quiet { 0 } else { 1 },
                    message: format!(
                        "kicker daemon already running on {} (pid {})",
                        meta.hostname, meta.pid
                    ),
                });
            }
        }

        let state_store =
            RuntimeStateStore::new(self.config.state_dir.join("runtime_state.json"));
        let mut runtime_state = match state_store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "runtime state unreadable, starting fresh");
                RuntimeState::default()
            }
        };

        let mut checks_log = LogWriter::new(
            self.config.state_dir.join("kicker_checks.log"),
            self.config.log_format,
        );
        let mut actions_log = LogWriter::new(
            self.config.state_dir.join("kicker_actions.log"),
            self.config.log_format,
        );

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let mut rules: BTreeMap<u64, Rule> = BTreeMap::new();
        let mut scheduler = RuleScheduler::new();
        for rule in &rule_config.rules {
            rules.insert(rule.id, rule.clone());
            runtime_state.get_or_insert(rule.id);
            scheduler.schedule(rule.id, self.clock.now());
        }
        // Drop state for rules removed while the daemon was down.
        runtime_state.rules.retain(|id, _| rules.contains_key(id));

        info!(
            rules = rules.len(),
            default_poll_interval = default_poll,
            lease_seconds,
            "daemon starting"
        );

        let mut store_mtime = store.mtime();
        let mut next_refresh = self.clock.now() + lease.refresh_interval();
        let mut passes: u64 = 0;
        let mut reload_requested = false;
        let mut exit: Option<RunSummary> = None;

        while exit.is_none() {
            // Lease refresh on its own cadence inside the same loop.
            if self.clock.now() >= next_refresh {
                match lease.refresh() {
                    Ok(()) => {
                        debug!("refreshed leader lease");
                        next_refresh = self.clock.now() + lease.refresh_interval();
                    }
                    Err(e @ (LeaseError::Foreign { .. } | LeaseError::MetadataLost)) => {
                        // Another daemon claimed the lease. Abdicate
                        // immediately; releasing would clobber it.
                        error!(error = %e, "lease lost, shutting down");
                        let _ = state_store.save(&runtime_state);
                        return Ok(RunSummary {
                            exit_code: 1,
                            message: format!("lease lost: {e}"),
                        });
                    }
                    Err(e) => {
                        let _ = state_store.save(&runtime_state);
                        let _ = lease.release();
                        return Err(e.into());
                    }
                }
            }

            // Pick up CLI edits: mtime poll, or SIGHUP forcing a reload.
            let mtime = store.mtime();
            if reload_requested || mtime != store_mtime {
                reload_requested = false;
                store_mtime = mtime;
                match store.load() {
                    Ok(new_config) => {
                        apply_rules(
                            &new_config,
                            &mut rules,
                            &mut scheduler,
                            &mut runtime_state,
                            self.clock.as_ref(),
                        );
                        default_poll = self
                            .config
                            .default_poll_interval
                            .unwrap_or(new_config.default_poll_interval);
                        debug!(rules = rules.len(), "rule store reloaded");
                    }
                    Err(e) => warn!(error = %e, "rule store reload failed, keeping previous rule set"),
                }
            }

            // Collect the due set once, then run each pass. Rules
            // rescheduled to "now" by an overrun wait for the next
            // iteration, so signals and the lease refresh still get
            // their turn between batches.
            let batch_now = self.clock.now();
            let mut due = Vec::new();
            while let Some(rule_id) = scheduler.pop_due(batch_now) {
                due.push(rule_id);
            }
            let mut ran_any = false;
            for rule_id in due {
                let Some(rule) = rules.get(&rule_id).cloned() else {
                    continue;
                };
                let t0 = self.clock.now();
                let report = self
                    .run_pass(
                        &rule,
                        default_poll,
                        &mut runtime_state,
                        &mut checks_log,
                        &mut actions_log,
                    )
                    .await;
                ran_any = true;
                passes += 1;

                debug!(
                    rule = rule.id,
                    check_exit = report.check_exit,
                    fired = report.fired,
                    throttled = report.throttled,
                    "pass complete"
                );

                if report.fired && rule.once {
                    info!(rule = rule.id, "removing one-shot rule after action");
                    rules.remove(&rule.id);
                    runtime_state.remove(rule.id);
                    scheduler.remove(rule.id);
                    match store.remove_rule(rule.id) {
                        // Our own write; skip the reload it would trigger.
                        Ok(_) => store_mtime = store.mtime(),
                        Err(e) => warn!(rule = rule.id, error = %e, "failed to persist once-rule removal"),
                    }
                } else {
                    // t0-anchored cadence: stable under execution jitter,
                    // backs off to `now` when a pass overran its slot.
                    let interval =
                        Duration::from_secs_f64(rule.effective_poll_interval(default_poll));
                    let next = t0 + interval;
                    let next = if next <= self.clock.now() {
                        self.clock.now()
                    } else {
                        next
                    };
                    scheduler.schedule(rule.id, next);
                }

                if let Some(max) = self.config.max_passes {
                    if passes >= max {
                        exit = Some(RunSummary {
                            exit_code: 0,
                            message: "daemon stopped (pass limit)".to_string(),
                        });
                        break;
                    }
                }
            }
            if ran_any {
                if let Err(e) = state_store.save(&runtime_state) {
                    warn!(error = %e, "failed to persist runtime state");
                }
            }
            if exit.is_some() {
                break;
            }

            // Wait for the earliest of: next due rule, lease refresh,
            // tick ceiling. Signals preempt the wait.
            let now = self.clock.now();
            let mut deadline = next_refresh;
            if let Some(due) = scheduler.next_deadline() {
                deadline = deadline.min(due);
            }
            let wait = deadline.saturating_duration_since(now).min(TICK);

            tokio::select! {
                biased;
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    exit = Some(RunSummary {
                        exit_code: 0,
                        message: "daemon stopped".to_string(),
                    });
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    exit = Some(RunSummary {
                        exit_code: 0,
                        message: "daemon stopped".to_string(),
                    });
                }
                _ = sighup.recv() => {
                    info!("received SIGHUP, reloading rule store");
                    reload_requested = true;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if let Err(e) = state_store.save(&runtime_state) {
            warn!(error = %e, "failed to persist runtime state at shutdown");
        }
        if let Err(e) = lease.release() {
            warn!(error = %e, "failed to release leader lease");
        }
        info!("daemon stopped");
        let summary = exit.unwrap_or(RunSummary {
            exit_code: 0,
            message: "daemon stopped".to_string(),
        });
        Ok(summary)
    }

    /// One pass: check, state shift, trigger, rate gate, action.
    async fn run_pass(
        &self,
        rule: &Rule,
        default_poll: f64,
        runtime_state: &mut RuntimeState,
        checks_log: &mut LogWriter,
        actions_log: &mut LogWriter,
    ) -> PassReport {
        let timeout = Duration::from_secs_f64(rule.effective_timeout(default_poll));

        let check_started = self.clock.now_unix();
        let check = self.runner.run(&rule.check, timeout).await;
        checks_log.append(&LogRecord {
            timestamp_unix: check_started,
            rule_id: rule.id,
            script: &script_name(&rule.check),
            phase: Phase::Check,
            exit_code: check.exit_code,
            duration_ms: check.duration.as_millis() as u64,
            stdout: &check.stdout,
            stderr: &check.stderr,
            stdout_truncated: check.stdout_truncated,
            stderr_truncated: check.stderr_truncated,
            timed_out: check.timed_out,
        });

        let rule_state = runtime_state.get_or_insert(rule.id);
        let prev = rule_state.prev_exit;
        let curr = check.exit_code;
        rule_state.record_check(curr, check_started);

        if !trigger_matches(rule.trigger, prev, curr) {
            return PassReport {
                check_exit: curr,
                fired: false,
                throttled: false,
            };
        }

        let limiter = RateLimiter::new(rule.effective_rate_limit(default_poll));
        let fire_at = self.clock.now_unix();
        if !limiter.permit(&mut rule_state.recent_fires, fire_at) {
            actions_log.append_throttled(fire_at, rule.id, &script_name(&rule.action));
            return PassReport {
                check_exit: curr,
                fired: false,
                throttled: true,
            };
        }

        let action_started = self.clock.now_unix();
        let action = self.runner.run(&rule.action, timeout).await;
        let rule_state = runtime_state.get_or_insert(rule.id);
        rule_state.record_action(action_started);
        actions_log.append(&LogRecord {
            timestamp_unix: action_started,
            rule_id: rule.id,
            script: &script_name(&rule.action),
            phase: Phase::Action,
            exit_code: action.exit_code,
            duration_ms: action.duration.as_millis() as u64,
            stdout: &action.stdout,
            stderr: &action.stderr,
            stdout_truncated: action.stdout_truncated,
            stderr_truncated: action.stderr_truncated,
            timed_out: action.timed_out,
        });

        PassReport {
            check_exit: curr,
            fired: true,
            throttled: false,
        }
    }
}

/// Fold a freshly loaded rule set into the live maps. New rules are due
/// immediately; removed rules drop their schedule and state; surviving
/// rules keep both.
fn apply_rules(
    new_config: &kicker_core::RuleConfig,
    rules: &mut BTreeMap<u64, Rule>,
    scheduler: &mut RuleScheduler,
    runtime_state: &mut RuntimeState,
    clock: &dyn Clock,
) {
    let removed: Vec<u64> = rules
        .keys()
        .filter(|id| new_config.rule(**id).is_none())
        .copied()
        .collect();
    for id in removed {
        rules.remove(&id);
        scheduler.remove(id);
        runtime_state.remove(id);
    }
    for rule in &new_config.rules {
        let known = rules.contains_key(&rule.id);
        rules.insert(rule.id, rule.clone());
        if !known {
            runtime_state.get_or_insert(rule.id);
            scheduler.schedule(rule.id, clock.now());
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
