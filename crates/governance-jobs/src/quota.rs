// crates/governance-jobs/src/quota.rs
// ============================================================================
// Module: Quota Manager
// Description: Per-tenant concurrency, rate, and budget accounting.
// Purpose: Decide reservations before any job state is persisted.
// Dependencies: governance-core
// ============================================================================

//! ## Overview
//! The quota manager holds per-tenant counters behind one mutex per tenant,
//! so tenants reserve and release in parallel. A reservation is taken at
//! enqueue and held until the job reaches a terminal state; it checks the
//! concurrency cap, the sliding enqueue window, and the cumulative cost
//! budget, returning a typed refusal naming the tripped limit and a
//! suggested retry delay. Counters are rebuilt from the job log on restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use governance_core::JobRecord;
use governance_core::QuotaDimension;
use governance_core::QuotaLimits;
use governance_core::QuotaRefusal;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::core::job::QuotaUsage;

// ============================================================================
// SECTION: Tenant State
// ============================================================================

/// Mutable quota counters for one tenant.
#[derive(Debug, Default)]
struct TenantUsage {
    /// Reserved slots (jobs in `{QUEUED, RUNNING, RETRYING}`).
    reserved: u32,
    /// Enqueue timestamps inside the sliding window (unix ms).
    window: VecDeque<i64>,
    /// Cost units consumed so far.
    cost_used: u64,
}

// ============================================================================
// SECTION: Quota Manager
// ============================================================================

/// Per-tenant quota accounting.
///
/// # Invariants
/// - Each tenant's counters are guarded by their own mutex, permitting
///   cross-tenant parallelism.
/// - `reserved` never exceeds `max_concurrent_jobs`.
pub struct QuotaManager {
    /// Default limits applied to tenants without an override.
    default_limits: QuotaLimits,
    /// Per-tenant limit overrides.
    overrides: BTreeMap<TenantId, QuotaLimits>,
    /// Per-tenant usage cells.
    states: Mutex<BTreeMap<TenantId, Arc<Mutex<TenantUsage>>>>,
}

impl QuotaManager {
    /// Creates a manager with default limits and per-tenant overrides.
    #[must_use]
    pub fn new(default_limits: QuotaLimits, overrides: BTreeMap<TenantId, QuotaLimits>) -> Self {
        Self {
            default_limits,
            overrides,
            states: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the limits in force for a tenant.
    #[must_use]
    pub fn limits_for(&self, tenant: &TenantId) -> QuotaLimits {
        self.overrides.get(tenant).copied().unwrap_or(self.default_limits)
    }

    /// Returns a usage snapshot for a tenant.
    #[must_use]
    pub fn usage(&self, tenant: &TenantId, now: Timestamp) -> QuotaUsage {
        let cell = self.cell(tenant);
        let mut usage = Self::lock_usage(&cell);
        let limits = self.limits_for(tenant);
        prune_window(&mut usage, limits, now);
        QuotaUsage {
            active_jobs: usage.reserved,
            jobs_in_window: u32::try_from(usage.window.len()).unwrap_or(u32::MAX),
            cost_used_units: usage.cost_used,
        }
    }

    /// Attempts a reservation for one job.
    ///
    /// # Errors
    ///
    /// Returns a [`QuotaRefusal`] naming the first tripped limit.
    pub fn reserve(
        &self,
        tenant: &TenantId,
        cost: u64,
        now: Timestamp,
    ) -> Result<(), QuotaRefusal> {
        let limits = self.limits_for(tenant);
        let cell = self.cell(tenant);
        let mut usage = Self::lock_usage(&cell);
        prune_window(&mut usage, limits, now);

        if usage.reserved >= limits.max_concurrent_jobs {
            return Err(QuotaRefusal {
                limit: QuotaDimension::MaxConcurrentJobs,
                retry_after_seconds: 30,
            });
        }
        if u32::try_from(usage.window.len()).unwrap_or(u32::MAX) >= limits.max_jobs_per_window {
            let retry_after = usage
                .window
                .front()
                .map_or(u64::from(limits.window_seconds), |oldest| {
                    let window_ms = i64::from(limits.window_seconds) * 1_000;
                    let expires = oldest.saturating_add(window_ms);
                    let remaining_ms = expires.saturating_sub(now.as_unix_millis()).max(1_000);
                    u64::try_from(remaining_ms / 1_000).unwrap_or(1)
                });
            return Err(QuotaRefusal {
                limit: QuotaDimension::MaxJobsPerWindow,
                retry_after_seconds: retry_after.max(1),
            });
        }
        if usage.cost_used.saturating_add(cost) > limits.cost_budget_units {
            return Err(QuotaRefusal {
                limit: QuotaDimension::CostBudgetUnits,
                retry_after_seconds: u64::from(limits.window_seconds).max(1),
            });
        }

        usage.reserved += 1;
        usage.window.push_back(now.as_unix_millis());
        usage.cost_used = usage.cost_used.saturating_add(cost);
        Ok(())
    }

    /// Releases a reservation on a terminal job transition.
    pub fn release(&self, tenant: &TenantId) {
        let cell = self.cell(tenant);
        let mut usage = Self::lock_usage(&cell);
        usage.reserved = usage.reserved.saturating_sub(1);
    }

    /// Rebuilds counters from replayed job records after a restart.
    ///
    /// `cost_of` maps a job type to its configured unit cost; cost is charged
    /// at reservation time and never refunded.
    pub fn rebuild(&self, records: &[JobRecord], now: Timestamp, cost_of: impl Fn(&str) -> u64) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.clear();
        drop(states);
        for record in records {
            let cell = self.cell(&record.tenant);
            let mut usage = Self::lock_usage(&cell);
            if record.status.is_active() || record.status == governance_core::JobStatus::Queued {
                usage.reserved += 1;
            }
            let limits = self.limits_for(&record.tenant);
            let window_ms = i64::from(limits.window_seconds) * 1_000;
            if now.as_unix_millis() - record.enqueued_at.as_unix_millis() < window_ms {
                usage.window.push_back(record.enqueued_at.as_unix_millis());
            }
            usage.cost_used = usage.cost_used.saturating_add(cost_of(&record.job_type));
        }
    }

    /// Returns (creating if needed) the usage cell for a tenant.
    fn cell(&self, tenant: &TenantId) -> Arc<Mutex<TenantUsage>> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(states.entry(tenant.clone()).or_default())
    }

    /// Locks a usage cell, recovering from poisoning.
    fn lock_usage(cell: &Arc<Mutex<TenantUsage>>) -> MutexGuard<'_, TenantUsage> {
        cell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops window entries older than the sliding window.
fn prune_window(usage: &mut TenantUsage, limits: QuotaLimits, now: Timestamp) {
    let window_ms = i64::from(limits.window_seconds) * 1_000;
    let cutoff = now.as_unix_millis().saturating_sub(window_ms);
    while let Some(oldest) = usage.window.front() {
        if *oldest <= cutoff {
            usage.window.pop_front();
        } else {
            break;
        }
    }
}
