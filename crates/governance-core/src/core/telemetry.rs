// crates/governance-core/src/core/telemetry.rs
// ============================================================================
// Module: Governance Telemetry
// Description: Observability hooks for registry, gate, and job operations.
// Purpose: Provide structured op records and metric samples without hard deps.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! This module exposes a thin telemetry interface: every operation emits a
//! structured [`OpRecord`] and components publish [`MetricSample`] values for
//! counters, gauges, and histograms. It is intentionally dependency-light so
//! deployments can plug in Prometheus or OpenTelemetry without redesign.
//! Security posture: telemetry must avoid leaking payloads or secrets and
//! treat labels as untrusted; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Metric Names
// ============================================================================

/// Counter: total artifacts published.
pub const METRIC_ARTIFACT_PUBLISH_TOTAL: &str = "artifact_publish_total";
/// Histogram: publish latency in milliseconds.
pub const METRIC_ARTIFACT_PUBLISH_LATENCY_MS: &str = "artifact_publish_latency_ms";
/// Gauge: waivers inside the seven-day expiry window.
pub const METRIC_WAIVER_EXPIRING_7D: &str = "waiver_expiring_7d";
/// Gauge: queued jobs per tenant.
pub const METRIC_JOB_QUEUE_DEPTH: &str = "job_queue_depth";
/// Histogram: job duration in milliseconds by type.
pub const METRIC_JOB_DURATION_MS: &str = "job_duration_ms";
/// Counter: job retry attempts.
pub const METRIC_JOB_RETRY_COUNT: &str = "job_retry_count";
/// Gauge: quota usage by tenant and dimension.
pub const METRIC_QUOTA_USAGE: &str = "quota_usage";
/// Counter: event chain verification passes.
pub const METRIC_EVENT_CHAIN_VERIFICATIONS_TOTAL: &str = "event_log_chain_verifications_total";
/// Counter: artifact rollbacks.
pub const METRIC_ROLLBACK_TOTAL: &str = "rollback_total";

// ============================================================================
// SECTION: Op Records
// ============================================================================

/// Operation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Operation succeeded.
    Ok,
    /// Operation failed.
    Error,
}

/// Structured log record for a single operation.
///
/// # Invariants
/// - `tenant` is `None` only for tenant-agnostic operations.
#[derive(Debug, Clone, Serialize)]
pub struct OpRecord {
    /// Operation timestamp.
    pub ts: Timestamp,
    /// Tenant the operation acted on, when scoped.
    pub tenant: Option<TenantId>,
    /// Component label (for example `publish_pipeline`, `job_service`).
    pub component: &'static str,
    /// Operation label (for example `publish`, `enqueue`).
    pub op: &'static str,
    /// Operation outcome.
    pub status: OpStatus,
    /// Operation duration in milliseconds.
    pub duration_ms: u64,
    /// Trace identifier correlating related records.
    pub trace_id: TraceId,
}

// ============================================================================
// SECTION: Metric Samples
// ============================================================================

/// Metric sample kind.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic counter increment.
    Counter,
    /// Point-in-time gauge value.
    Gauge,
    /// Histogram observation.
    Histogram,
}

/// Single metric observation.
///
/// # Invariants
/// - Label keys and values avoid raw payload content.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    /// Metric name (one of the `METRIC_*` constants).
    pub name: &'static str,
    /// Sample kind.
    pub kind: MetricKind,
    /// Observed value.
    pub value: u64,
    /// Metric labels.
    pub labels: BTreeMap<&'static str, String>,
}

impl MetricSample {
    /// Creates a counter increment sample.
    #[must_use]
    pub fn counter(name: &'static str, value: u64) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            value,
            labels: BTreeMap::new(),
        }
    }

    /// Creates a gauge sample.
    #[must_use]
    pub fn gauge(name: &'static str, value: u64) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            value,
            labels: BTreeMap::new(),
        }
    }

    /// Creates a histogram observation sample.
    #[must_use]
    pub fn histogram(name: &'static str, value: u64) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            value,
            labels: BTreeMap::new(),
        }
    }

    /// Attaches a label to the sample.
    #[must_use]
    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.insert(key, value.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Telemetry sink for operation records and metric samples.
pub trait Telemetry: Send + Sync {
    /// Records a structured operation log line.
    fn record_op(&self, record: &OpRecord);
    /// Records a metric sample.
    fn record_metric(&self, sample: &MetricSample);
}

/// No-op telemetry sink.
///
/// # Invariants
/// - Records are intentionally discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_op(&self, _record: &OpRecord) {}

    fn record_metric(&self, _sample: &MetricSample) {}
}
