// crates/governance-jobs/tests/quota.rs
// ============================================================================
// Module: Quota Manager Tests
// Description: Window, concurrency, and budget accounting boundaries.
// ============================================================================
//! ## Overview
//! Exercises the quota manager in isolation with a deterministic clock:
//! boundary admission at each limit, refusal dimensions and retry hints,
//! window expiry, and release on terminal transitions.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeMap;

use governance_core::QuotaDimension;
use governance_core::QuotaLimits;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_jobs::QuotaManager;

fn tenant(name: &str) -> TenantId {
    TenantId::new(name).expect("tenant")
}

fn limits() -> QuotaLimits {
    QuotaLimits {
        max_concurrent_jobs: 2,
        max_jobs_per_window: 3,
        window_seconds: 60,
        cost_budget_units: 10,
    }
}

fn ts(seconds: i64) -> Timestamp {
    Timestamp::from_unix_millis(seconds * 1_000)
}

#[test]
fn admits_exactly_to_the_concurrency_limit() {
    let quota = QuotaManager::new(limits(), BTreeMap::new());
    let acme = tenant("acme");
    quota.reserve(&acme, 1, ts(0)).expect("first");
    quota.reserve(&acme, 1, ts(0)).expect("second");
    let refusal = quota.reserve(&acme, 1, ts(0)).unwrap_err();
    assert_eq!(refusal.limit, QuotaDimension::MaxConcurrentJobs);
    assert!(refusal.retry_after_seconds > 0);
}

#[test]
fn release_frees_a_concurrency_slot() {
    let quota = QuotaManager::new(limits(), BTreeMap::new());
    let acme = tenant("acme");
    quota.reserve(&acme, 1, ts(0)).expect("first");
    quota.reserve(&acme, 1, ts(0)).expect("second");
    quota.release(&acme);
    quota.reserve(&acme, 1, ts(1)).expect("slot freed");
}

#[test]
fn window_limit_trips_and_recovers_after_expiry() {
    let relaxed = QuotaLimits {
        max_concurrent_jobs: 100,
        ..limits()
    };
    let quota = QuotaManager::new(relaxed, BTreeMap::new());
    let acme = tenant("acme");
    for second in 0 .. 3 {
        quota.reserve(&acme, 1, ts(second)).expect("inside window");
    }
    let refusal = quota.reserve(&acme, 1, ts(3)).unwrap_err();
    assert_eq!(refusal.limit, QuotaDimension::MaxJobsPerWindow);
    assert!(refusal.retry_after_seconds >= 1);

    // Beyond the window the oldest entries fall out and admission resumes.
    quota.reserve(&acme, 1, ts(62)).expect("window slid");
}

#[test]
fn cost_budget_is_cumulative_and_never_refunded() {
    let relaxed = QuotaLimits {
        max_concurrent_jobs: 100,
        max_jobs_per_window: 100,
        ..limits()
    };
    let quota = QuotaManager::new(relaxed, BTreeMap::new());
    let acme = tenant("acme");
    quota.reserve(&acme, 6, ts(0)).expect("within budget");
    quota.release(&acme);
    let refusal = quota.reserve(&acme, 5, ts(100)).unwrap_err();
    assert_eq!(refusal.limit, QuotaDimension::CostBudgetUnits, "6 + 5 exceeds 10");
    quota.reserve(&acme, 4, ts(100)).expect("6 + 4 fits the budget");
}

#[test]
fn tenants_are_isolated() {
    let quota = QuotaManager::new(limits(), BTreeMap::new());
    let acme = tenant("acme");
    let globex = tenant("globex");
    quota.reserve(&acme, 1, ts(0)).expect("acme");
    quota.reserve(&acme, 1, ts(0)).expect("acme");
    quota.reserve(&acme, 1, ts(0)).unwrap_err();
    quota.reserve(&globex, 1, ts(0)).expect("globex unaffected");
}

#[test]
fn overrides_replace_default_limits() {
    let mut overrides = BTreeMap::new();
    overrides.insert(
        tenant("vip"),
        QuotaLimits {
            max_concurrent_jobs: 5,
            ..limits()
        },
    );
    let quota = QuotaManager::new(limits(), overrides);
    let vip = tenant("vip");
    for _ in 0 .. 5 {
        quota.reserve(&vip, 1, ts(0)).expect("override in force");
    }
    let refusal = quota.reserve(&vip, 1, ts(0)).unwrap_err();
    assert_eq!(refusal.limit, QuotaDimension::MaxConcurrentJobs);
}

#[test]
fn usage_snapshot_reflects_counters() {
    let quota = QuotaManager::new(limits(), BTreeMap::new());
    let acme = tenant("acme");
    quota.reserve(&acme, 3, ts(0)).expect("reserve");
    let usage = quota.usage(&acme, ts(1));
    assert_eq!(usage.active_jobs, 1);
    assert_eq!(usage.jobs_in_window, 1);
    assert_eq!(usage.cost_used_units, 3);
}
