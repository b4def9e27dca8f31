// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kicker_core::FakeClock;
use std::time::Duration;

fn host(
    dir: &tempfile::TempDir,
    clock: &FakeClock,
    hostname: &str,
    pid: u32,
) -> LeaseStore {
    LeaseStore::with_identity(
        dir.path(),
        30.0,
        10.0,
        Arc::new(clock.clone()),
        hostname.to_string(),
        pid,
    )
}

#[test]
fn acquire_writes_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);

    assert!(matches!(lease.try_acquire().unwrap(), Claim::Acquired));

    let meta = lease.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-a");
    assert_eq!(meta.pid, 100);
    assert!((meta.lease_expires_at - (clock.now_unix() + 30.0)).abs() < 1e-6);
}

#[test]
fn second_claimant_sees_held_by() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    assert!(matches!(a.try_acquire().unwrap(), Claim::Acquired));

    match b.try_acquire().unwrap() {
        Claim::HeldBy(meta) => {
            assert_eq!(meta.hostname, "host-a");
            assert_eq!(meta.pid, 100);
        }
        other => panic!("expected HeldBy, got {other:?}"),
    }

    // The metadata still names the original holder.
    let meta = a.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-a");
}

#[test]
fn expired_lease_within_grace_is_still_held() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    a.try_acquire().unwrap();

    // Past expiry (30s) but inside grace (10s more).
    clock.advance(Duration::from_secs(35));
    assert!(matches!(b.try_acquire().unwrap(), Claim::HeldBy(_)));
}

#[test]
fn stale_lease_is_reclaimed_past_grace() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    a.try_acquire().unwrap();
    clock.advance(Duration::from_secs(41));

    match b.try_acquire().unwrap() {
        Claim::Stale(old) => {
            assert_eq!(old.hostname, "host-a");
        }
        other => panic!("expected Stale, got {other:?}"),
    }

    let meta = b.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-b");
    assert_eq!(meta.pid, 200);
}

#[test]
fn refresh_extends_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);
    lease.try_acquire().unwrap();

    clock.advance(Duration::from_secs(20));
    lease.refresh().unwrap();

    let meta = lease.read().unwrap().unwrap();
    assert!((meta.lease_expires_at - (clock.now_unix() + 30.0)).abs() < 1e-6);
}

#[test]
fn refresh_detects_foreign_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    a.try_acquire().unwrap();
    // B steals the lease after expiry + grace.
    clock.advance(Duration::from_secs(41));
    assert!(matches!(b.try_acquire().unwrap(), Claim::Stale(_)));

    // A's next refresh must refuse to clobber B's claim.
    match a.refresh() {
        Err(LeaseError::Foreign { hostname, pid }) => {
            assert_eq!(hostname, "host-b");
            assert_eq!(pid, 200);
        }
        other => panic!("expected Foreign, got {other:?}"),
    }

    // And B's metadata is untouched.
    let meta = b.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-b");
}

#[test]
fn refresh_fails_when_metadata_vanishes() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);
    lease.try_acquire().unwrap();

    std::fs::remove_file(dir.path().join("leader.lock/leader.json")).unwrap();
    assert!(matches!(lease.refresh(), Err(LeaseError::MetadataLost)));
}

#[test]
fn release_removes_claim_completely() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);

    lease.try_acquire().unwrap();
    lease.release().unwrap();

    assert!(lease.read().unwrap().is_none());
    // No files remain under the state directory.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    // And the lease can be taken again.
    assert!(matches!(lease.try_acquire().unwrap(), Claim::Acquired));
}

#[test]
fn release_does_not_clobber_a_foreign_claim() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    a.try_acquire().unwrap();
    clock.advance(Duration::from_secs(41));
    b.try_acquire().unwrap();

    // A releasing late must leave B's claim in place.
    a.release().unwrap();
    let meta = b.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-b");
}

#[test]
fn corrupt_metadata_is_treated_as_stale() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);

    std::fs::create_dir_all(dir.path().join("leader.lock")).unwrap();
    std::fs::write(dir.path().join("leader.lock/leader.json"), "{garbage").unwrap();

    // An unreadable claim cannot be honored; we take over.
    assert!(matches!(lease.try_acquire().unwrap(), Claim::Acquired));
    let meta = lease.read().unwrap().unwrap();
    assert_eq!(meta.hostname, "host-a");
}

#[test]
fn graceful_handoff_between_hosts() {
    // Host A runs and exits gracefully; host B then acquires cleanly.
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let a = host(&dir, &clock, "host-a", 100);
    let b = host(&dir, &clock, "host-b", 200);

    a.try_acquire().unwrap();
    assert!(matches!(b.try_acquire().unwrap(), Claim::HeldBy(_)));

    a.release().unwrap();
    assert!(matches!(b.try_acquire().unwrap(), Claim::Acquired));
    assert_eq!(b.read().unwrap().unwrap().hostname, "host-b");
}

#[test]
fn refresh_interval_is_a_third_of_the_lease() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let lease = host(&dir, &clock, "host-a", 100);
    assert_eq!(lease.refresh_interval(), Duration::from_secs(10));

    let short = LeaseStore::with_identity(
        dir.path(),
        2.0,
        10.0,
        Arc::new(clock.clone()),
        "host-a".to_string(),
        100,
    );
    // Floored at one second.
    assert_eq!(short.refresh_interval(), Duration::from_secs(1));
}

#[test]
fn local_hostname_is_nonempty() {
    assert!(!local_hostname().is_empty());
}
