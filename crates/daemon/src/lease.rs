// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NFS-safe leader lease over a state directory.
//!
//! The atomic primitive is exclusive directory creation at a fixed
//! path, which is atomic on NFSv3+ when the same path is contended
//! (file-level exclusive open flags are not reliable on all NFS
//! clients). The metadata file lives *inside* the lock directory so a
//! half-built claim is removed together with its directory. Crashed
//! holders are reclaimed after lease expiry plus a grace period.

use kicker_core::Clock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the lock directory under the state dir.
const LOCK_DIR_NAME: &str = "leader.lock";

/// Name of the metadata file inside the lock directory.
const META_FILE_NAME: &str = "leader.json";

/// Persisted leader metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderMeta {
    pub hostname: String,
    pub pid: u32,
    /// Wall-clock seconds when the leader started.
    pub start_time: f64,
    /// Wall-clock seconds when the lease lapses unless refreshed.
    pub lease_expires_at: f64,
}

/// Outcome of a claim attempt.
#[derive(Debug)]
pub enum Claim {
    /// The lock directory was created and the lease is ours.
    Acquired,
    /// A previous claim had expired past its grace period; it was
    /// removed and the lease is now ours. Callers treat this as
    /// acquired.
    Stale(LeaderMeta),
    /// A live claim exists (or the bounded takeover retry lost a race).
    HeldBy(LeaderMeta),
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("leader metadata is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("lease now belongs to {hostname} (pid {pid})")]
    Foreign { hostname: String, pid: u32 },
    #[error("leader metadata disappeared during refresh")]
    MetadataLost,
    #[error("lock directory was re-claimed during stale takeover")]
    Contended,
}

/// Leader lease store for one state directory.
pub struct LeaseStore {
    lock_dir: PathBuf,
    lease_seconds: f64,
    grace_seconds: f64,
    clock: Arc<dyn Clock>,
    hostname: String,
    pid: u32,
    start_time: f64,
}

impl LeaseStore {
    /// Lease store identifying the current process.
    pub fn new(
        state_dir: impl Into<PathBuf>,
        lease_seconds: f64,
        grace_seconds: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let hostname = local_hostname();
        let pid = std::process::id();
        Self::with_identity(state_dir, lease_seconds, grace_seconds, clock, hostname, pid)
    }

    /// Lease store with an explicit identity. Tests use this to act as
    /// another host contending for the same directory.
    pub fn with_identity(
        state_dir: impl Into<PathBuf>,
        lease_seconds: f64,
        grace_seconds: f64,
        clock: Arc<dyn Clock>,
        hostname: String,
        pid: u32,
    ) -> Self {
        let start_time = clock.now_unix();
        Self {
            lock_dir: state_dir.into().join(LOCK_DIR_NAME),
            lease_seconds,
            grace_seconds,
            clock,
            hostname,
            pid,
            start_time,
        }
    }

    fn meta_path(&self) -> PathBuf {
        self.lock_dir.join(META_FILE_NAME)
    }

    /// Attempt to claim the lease. At most one stale takeover retry is
    /// made, so contention cannot thrash.
    pub fn try_acquire(&self) -> Result<Claim, LeaseError> {
        match fs::create_dir(&self.lock_dir) {
            Ok(()) => {
                self.write_meta()?;
                Ok(Claim::Acquired)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => self.contend(),
            Err(e) => Err(e.into()),
        }
    }

    fn contend(&self) -> Result<Claim, LeaseError> {
        let existing = match self.read() {
            Ok(meta) => meta,
            Err(LeaseError::Corrupt(e)) => {
                // An unreadable claim cannot be honored; treat as stale.
                warn!(error = %e, "leader metadata unreadable, treating claim as stale");
                None
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now_unix();
        if let Some(ref meta) = existing {
            if now <= meta.lease_expires_at + self.grace_seconds {
                return Ok(Claim::HeldBy(meta.clone()));
            }
        }

        debug!(lock_dir = %self.lock_dir.display(), "removing stale leader claim");
        fs::remove_dir_all(&self.lock_dir)?;
        match fs::create_dir(&self.lock_dir) {
            Ok(()) => {
                self.write_meta()?;
                match existing {
                    Some(meta) => Ok(Claim::Stale(meta)),
                    None => Ok(Claim::Acquired),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Someone else took over between our removal and retry.
                match self.read()? {
                    Some(meta) => Ok(Claim::HeldBy(meta)),
                    None => Err(LeaseError::Contended),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Extend the lease. Fails with [`LeaseError::Foreign`] if the
    /// metadata no longer names this process; the caller must then shut
    /// down immediately without releasing (split-brain defense).
    pub fn refresh(&self) -> Result<(), LeaseError> {
        match self.read()? {
            Some(meta) if meta.hostname == self.hostname && meta.pid == self.pid => {
                self.write_meta()
            }
            Some(meta) => Err(LeaseError::Foreign {
                hostname: meta.hostname,
                pid: meta.pid,
            }),
            None => Err(LeaseError::MetadataLost),
        }
    }

    /// Release the lease if it still names this process. Releasing a
    /// lease we no longer hold would clobber the new leader.
    pub fn release(&self) -> Result<(), LeaseError> {
        match self.read() {
            Ok(Some(meta)) if meta.hostname == self.hostname && meta.pid == self.pid => {
                fs::remove_dir_all(&self.lock_dir)?;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(LeaseError::Corrupt(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read the current leader metadata, if any.
    pub fn read(&self) -> Result<Option<LeaderMeta>, LeaseError> {
        let text = match fs::read_to_string(self.meta_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Interval between refreshes: a third of the lease, floored at 1s.
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64((self.lease_seconds / 3.0).max(1.0))
    }

    fn write_meta(&self) -> Result<(), LeaseError> {
        let meta = LeaderMeta {
            hostname: self.hostname.clone(),
            pid: self.pid,
            start_time: self.start_time,
            lease_expires_at: self.clock.now_unix() + self.lease_seconds,
        };
        let mut text = serde_json::to_string_pretty(&meta)?;
        text.push('\n');
        // Write-then-rename so readers never observe a partial document.
        let tmp = self.lock_dir.join("leader.json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, self.meta_path())?;
        Ok(())
    }
}

/// Best-effort hostname for leader identity and the stop contract.
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            fs::read_to_string("/proc/sys/kernel/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
