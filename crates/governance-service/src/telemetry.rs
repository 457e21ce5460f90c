// crates/governance-service/src/telemetry.rs
// ============================================================================
// Module: Service Telemetry Sinks
// Description: Structured stderr sink for op records and metric samples.
// Purpose: Emit one JSON line per observation without heavyweight deps.
// Dependencies: governance-core, serde_json
// ============================================================================

//! ## Overview
//! The default deployment sink writes one JSON object per line to stderr:
//! operation records as `{"record":"op",...}` and metric samples as
//! `{"record":"metric",...}`. Collectors tail the stream; deployments that
//! want Prometheus or OpenTelemetry implement [`Telemetry`] themselves and
//! inject it instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use governance_core::MetricSample;
use governance_core::OpRecord;
use governance_core::Telemetry;
use serde_json::json;

// ============================================================================
// SECTION: Stderr Sink
// ============================================================================

/// JSON-lines telemetry sink writing to stderr.
///
/// # Invariants
/// - Lines are self-contained JSON objects; write failures are swallowed
///   (telemetry never takes down the service).
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTelemetry;

impl StderrTelemetry {
    /// Writes one JSON value as a line to stderr.
    fn write_line(value: &serde_json::Value) {
        let mut stderr = std::io::stderr().lock();
        if writeln!(stderr, "{value}").is_err() {
            // Telemetry is best effort.
        }
    }
}

impl Telemetry for StderrTelemetry {
    fn record_op(&self, record: &OpRecord) {
        if let Ok(payload) = serde_json::to_value(record) {
            Self::write_line(&json!({"record": "op", "op": payload}));
        }
    }

    fn record_metric(&self, sample: &MetricSample) {
        if let Ok(payload) = serde_json::to_value(sample) {
            Self::write_line(&json!({"record": "metric", "metric": payload}));
        }
    }
}
