// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction separating monotonic and wall-clock time.
//!
//! Scheduling decisions use the monotonic clock (immune to NTP steps);
//! rate-limit windows, lease expiry, and log timestamps use wall-clock
//! seconds. The two are not interchangeable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the daemon.
pub trait Clock: Send + Sync {
    /// Monotonic instant, for scheduling.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch.
    fn now_unix(&self) -> f64;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_unix(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Manually advanced clock for tests.
///
/// Both the monotonic and the wall clock move together on
/// [`advance`](FakeClock::advance); neither moves on its own.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<FakeClockInner>,
}

#[derive(Debug)]
struct FakeClockInner {
    base: Instant,
    base_unix: f64,
    offset_micros: AtomicU64,
}

/// Arbitrary but fixed epoch for fake wall-clock time.
const FAKE_EPOCH_UNIX: f64 = 1_750_000_000.0;

impl FakeClock {
    /// Create a fake clock frozen at its epoch.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FakeClockInner {
                base: Instant::now(),
                base_unix: FAKE_EPOCH_UNIX,
                offset_micros: AtomicU64::new(0),
            }),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.inner.offset_micros.fetch_add(micros, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_micros(self.inner.offset_micros.load(Ordering::SeqCst))
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.base + self.offset()
    }

    fn now_unix(&self) -> f64 {
        self.inner.base_unix + self.offset().as_secs_f64()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
