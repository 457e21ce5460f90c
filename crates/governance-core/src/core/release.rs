// crates/governance-core/src/core/release.rs
// ============================================================================
// Module: Release Gate
// Description: Policy evaluation for release manifests before promotion.
// Purpose: Approve or reject a release against approvals, rehearsal, waivers.
// Dependencies: crate::core::{artifact, identifiers, time, waiver}, serde
// ============================================================================

//! ## Overview
//! The release gate evaluates a `release_manifest` artifact against a policy
//! pack. The decision is `APPROVE` only when every required approval role is
//! present, the referenced rollback rehearsal is fresh, no disallowed or
//! invalid waiver is relied upon, and every required readiness gate reports
//! `PASS`. Rejections carry machine-readable reason slugs; callers must honor
//! the decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::artifact::Manifest;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;
use crate::core::waiver::Waiver;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Release gate policy pack.
///
/// # Invariants
/// - `max_rehearsal_age_days` of zero means the rehearsal must be same-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Roles whose approval must be present on the manifest.
    pub required_approvals: Vec<RoleName>,
    /// Maximum age of the rollback rehearsal in days.
    pub max_rehearsal_age_days: i64,
    /// Whether the release may rely on waivers at all.
    pub allow_waivers: bool,
    /// Readiness gates that must report `PASS`.
    pub required_readiness_gates: Vec<String>,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Gate decision outcome.
///
/// # Invariants
/// - Wire form is the SCREAMING_SNAKE_CASE outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateOutcome {
    /// Release may proceed.
    Approve,
    /// Release is blocked.
    Reject,
}

impl GateOutcome {
    /// Returns the stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release gate decision with reasons and trace correlation.
///
/// # Invariants
/// - `reasons` is empty exactly when the outcome is `Approve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Decision outcome.
    pub decision: GateOutcome,
    /// Machine-readable rejection reason slugs.
    pub reasons: Vec<String>,
    /// Trace identifier correlating the decision with telemetry and events.
    pub trace_id: TraceId,
}

// ============================================================================
// SECTION: Release Payload Shape
// ============================================================================

/// Readiness gate result embedded in a release manifest payload.
///
/// # Invariants
/// - `status` is compared case-sensitively against `PASS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessGateResult {
    /// Gate identifier.
    pub gate_id: String,
    /// Reported status (`PASS` or a failure label).
    pub status: String,
}

/// Typed view of a release manifest payload.
///
/// # Invariants
/// - `rollback_rehearsal_at` is unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    /// Timestamp of the most recent rollback rehearsal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_rehearsal_at: Option<Timestamp>,
    /// Readiness gate results collected by deployment automation.
    #[serde(default)]
    pub readiness_gates: Vec<ReadinessGateResult>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Reason slug: a required approval role is missing.
pub const REASON_MISSING_APPROVAL: &str = "missing_approval";
/// Reason slug: the rollback rehearsal is older than permitted.
pub const REASON_STALE_REHEARSAL: &str = "stale_rollback_rehearsal";
/// Reason slug: no rollback rehearsal is recorded at all.
pub const REASON_MISSING_REHEARSAL: &str = "missing_rollback_rehearsal";
/// Reason slug: the policy forbids relying on waivers.
pub const REASON_WAIVERS_NOT_ALLOWED: &str = "waivers_not_allowed";
/// Reason slug: a relied-upon waiver is unknown, unapproved, or expired.
pub const REASON_INVALID_WAIVER: &str = "invalid_waiver";
/// Reason slug: a required readiness gate did not report `PASS`.
pub const REASON_READINESS_GATE_FAILED: &str = "readiness_gate_failed";

/// Evaluates a release manifest against a gate policy.
///
/// `waivers` carries the resolved state of every waiver the manifest relies
/// upon; unknown identifiers must be passed as `None`.
#[must_use]
pub fn evaluate(
    manifest: &Manifest,
    payload: &ReleasePayload,
    waivers: &[(String, Option<Waiver>)],
    policy: &GatePolicy,
    now: Timestamp,
    trace_id: TraceId,
) -> GateDecision {
    let mut reasons = Vec::new();

    for role in &policy.required_approvals {
        let present = manifest.approvals.iter().any(|approval| approval.role == *role);
        if !present {
            reasons.push(format!("{REASON_MISSING_APPROVAL}:{role}"));
        }
    }

    match payload.rollback_rehearsal_at {
        Some(rehearsed_at) => {
            if now.days_since(rehearsed_at) > policy.max_rehearsal_age_days {
                reasons.push(REASON_STALE_REHEARSAL.to_string());
            }
        }
        None => reasons.push(REASON_MISSING_REHEARSAL.to_string()),
    }

    if manifest.waivers.is_empty() {
        // No waivers relied upon; nothing to check.
    } else if policy.allow_waivers {
        for (waiver_id, waiver) in waivers {
            let valid = waiver.as_ref().is_some_and(|waiver| waiver.is_valid_at(now));
            if !valid {
                reasons.push(format!("{REASON_INVALID_WAIVER}:{waiver_id}"));
            }
        }
    } else {
        reasons.push(REASON_WAIVERS_NOT_ALLOWED.to_string());
    }

    for gate_id in &policy.required_readiness_gates {
        let passed = payload
            .readiness_gates
            .iter()
            .any(|result| result.gate_id == *gate_id && result.status == "PASS");
        if !passed {
            reasons.push(format!("{REASON_READINESS_GATE_FAILED}:{gate_id}"));
        }
    }

    let decision = if reasons.is_empty() {
        GateOutcome::Approve
    } else {
        GateOutcome::Reject
    };
    GateDecision {
        decision,
        reasons,
        trace_id,
    }
}

/// Builds the `deployment_gate` event payload for a decision.
#[must_use]
pub fn decision_event_payload(decision: &GateDecision) -> Value {
    serde_json::json!({
        "decision": decision.decision,
        "reasons": decision.reasons,
        "trace_id": decision.trace_id,
    })
}
