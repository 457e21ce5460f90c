// crates/governance-core/src/core/job.rs
// ============================================================================
// Module: Job and Quota Model
// Description: Job records, requests, statuses, and quota envelopes.
// Purpose: Shared shapes between the job service, stores, and HTTP surface.
// Dependencies: crate::core::{hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A job is an asynchronous unit of work submitted by pipeline modules and
//! scheduled under tenant quotas. Job records are append-logged on every
//! transition so the scheduler and quota counters can be rebuilt by replay
//! after a restart. Idempotency keys deduplicate unfinished work: at any
//! moment at most one job per key is in `{QUEUED, RUNNING, RETRYING}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::JobId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// Job lifecycle status.
///
/// # Invariants
/// - Wire form is the SCREAMING_SNAKE_CASE status label.
/// - `Succeeded`, `Failed`, and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted and waiting for a worker.
    Queued,
    /// Executing on a worker.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Failed terminally.
    Failed,
    /// Canceled by the caller.
    Canceled,
    /// Awaiting a retry attempt after a transient failure.
    Retrying,
}

impl JobStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Retrying => "RETRYING",
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Returns whether the status counts against active concurrency.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Job Records
// ============================================================================

/// Caller-submitted job request.
///
/// # Invariants
/// - `job_type` must resolve in the handler registry at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Project label within the tenant.
    pub project: String,
    /// Handler type key.
    pub job_type: String,
    /// Structured job payload.
    pub payload: Value,
    /// Submitting actor.
    pub actor: ActorId,
    /// Submission reason for the audit trail.
    pub reason: String,
    /// Optional idempotency key (derived from type + payload when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Persistent job record, append-logged on every transition.
///
/// # Invariants
/// - `retries <= max_retries`.
/// - Timestamps are set exactly once per transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub job_id: JobId,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Project label within the tenant.
    pub project: String,
    /// Handler type key.
    pub job_type: String,
    /// Submitted payload (persisted so recovery can replay the job).
    pub payload: Value,
    /// Canonical hash of the submitted payload.
    pub payload_hash: HashDigest,
    /// Submitting actor.
    pub actor: ActorId,
    /// Submission reason for the audit trail.
    pub reason: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Retry attempts performed so far.
    pub retries: u32,
    /// Maximum retry attempts.
    pub max_retries: u32,
    /// Enqueue timestamp.
    pub enqueued_at: Timestamp,
    /// First execution start timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Terminal transition timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// Pointer to the captured handler log, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_pointer: Option<String>,
    /// Idempotency key deduplicating unfinished submissions.
    pub idempotency_key: String,
}

// ============================================================================
// SECTION: Quotas
// ============================================================================

/// Per-tenant resource envelope enforced by the scheduler.
///
/// # Invariants
/// - All limits are interpreted as inclusive maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Maximum jobs in `{RUNNING, RETRYING}` at once.
    pub max_concurrent_jobs: u32,
    /// Maximum jobs enqueued within the sliding window.
    pub max_jobs_per_window: u32,
    /// Sliding window length in seconds.
    pub window_seconds: u32,
    /// Total cost budget in abstract units.
    pub cost_budget_units: u64,
}

/// Current quota consumption for a tenant.
///
/// # Invariants
/// - Counters are rebuilt from the job log on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Jobs currently counting against concurrency.
    pub active_jobs: u32,
    /// Jobs enqueued within the current window.
    pub jobs_in_window: u32,
    /// Cost units consumed so far.
    pub cost_used_units: u64,
}

/// Quota dimension that refused a reservation.
///
/// # Invariants
/// - Wire form is the snake_case limit label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    /// Active concurrency limit.
    MaxConcurrentJobs,
    /// Sliding-window enqueue rate limit.
    MaxJobsPerWindow,
    /// Cumulative cost budget.
    CostBudgetUnits,
    /// Bounded per-tenant queue capacity.
    QueueCapacity,
}

impl QuotaDimension {
    /// Returns the stable label for the dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxConcurrentJobs => "max_concurrent_jobs",
            Self::MaxJobsPerWindow => "max_jobs_per_window",
            Self::CostBudgetUnits => "cost_budget_units",
            Self::QueueCapacity => "queue_capacity",
        }
    }
}

impl fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed quota refusal with the tripped limit and a retry hint.
///
/// # Invariants
/// - `retry_after_seconds` is strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRefusal {
    /// Limit that tripped.
    pub limit: QuotaDimension,
    /// Suggested delay before retrying.
    pub retry_after_seconds: u64,
}
