// crates/governance-core/tests/release_gate.rs
// ============================================================================
// Module: Release Gate Tests
// Description: Policy evaluation over release manifests.
// ============================================================================
//! ## Overview
//! Evaluates release manifests against gate policies: stale and missing
//! rollback rehearsals, missing approvals, waiver policy, readiness gates,
//! and the recorded `deployment_gate` event.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use governance_core::ArtifactClass;
use governance_core::ChangeImpact;
use governance_core::EventKind;
use governance_core::GateOutcome;
use governance_core::GatePolicy;
use governance_core::Manifest;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::interfaces::EventLog;
use serde_json::Value;
use serde_json::json;

mod common;

use common::EPOCH;
use common::harness;
use common::manifest_draft;
use common::pin;
use common::publish_kos;
use common::ready_proposal;

/// Days in milliseconds.
const DAY_MS: i64 = 86_400_000;

fn release_payload(rehearsed_days_ago: Option<i64>, gates: &[(&str, &str)]) -> Value {
    let gates: Vec<Value> = gates
        .iter()
        .map(|(gate_id, status)| json!({"gate_id": gate_id, "status": status}))
        .collect();
    match rehearsed_days_ago {
        Some(days) => json!({
            "rollback_rehearsal_at": EPOCH - days * DAY_MS,
            "readiness_gates": gates,
        }),
        None => json!({"readiness_gates": gates}),
    }
}

fn permissive_policy() -> GatePolicy {
    GatePolicy {
        required_approvals: vec!["maintainer".into(), "qa".into()],
        max_rehearsal_age_days: 30,
        allow_waivers: true,
        required_readiness_gates: vec!["smoke".to_string()],
    }
}

fn publish_release(h: &common::Harness, slug: &str, payload: Value) -> Manifest {
    let kos = publish_kos(h, "acme", &format!("{slug}-kos"));
    let draft = manifest_draft(
        ArtifactClass::ReleaseManifest,
        "acme",
        slug,
        "1.0.0",
        ChangeImpact::Patch,
        vec![pin(&kos)],
    );
    let proposal = ready_proposal(&h.registry, draft, payload);
    h.registry.publish(proposal).expect("publish release manifest")
}

#[test]
fn fresh_release_is_approved() {
    let h = harness();
    let manifest =
        publish_release(&h, "rel-1", release_payload(Some(3), &[("smoke", "PASS")]));
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Approve);
    assert!(decision.reasons.is_empty());
}

#[test]
fn stale_rehearsal_rejects_with_reason() {
    let h = harness();
    let manifest =
        publish_release(&h, "rel-stale", release_payload(Some(45), &[("smoke", "PASS")]));
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Reject);
    assert!(decision.reasons.iter().any(|reason| reason == "stale_rollback_rehearsal"));

    let tenant = TenantId::new("acme").expect("tenant");
    let events = h.events.read(&tenant, 1, 100).expect("events");
    let gate_event = events
        .iter()
        .find(|event| event.kind == EventKind::DeploymentGate)
        .expect("deployment_gate event recorded");
    assert_eq!(gate_event.subject_id, manifest.artifact_id.to_string());
}

#[test]
fn rehearsal_at_exact_age_limit_is_accepted() {
    let h = harness();
    let manifest =
        publish_release(&h, "rel-edge", release_payload(Some(30), &[("smoke", "PASS")]));
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Approve, "30 days old within 30-day policy");
}

#[test]
fn missing_rehearsal_rejects() {
    let h = harness();
    let manifest =
        publish_release(&h, "rel-none", release_payload(None, &[("smoke", "PASS")]));
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Reject);
    assert!(decision.reasons.iter().any(|reason| reason == "missing_rollback_rehearsal"));
}

#[test]
fn missing_required_approval_rejects_with_role() {
    let h = harness();
    let manifest =
        publish_release(&h, "rel-appr", release_payload(Some(1), &[("smoke", "PASS")]));
    let mut policy = permissive_policy();
    policy.required_approvals.push("governance".into());
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &policy, &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Reject);
    assert!(decision.reasons.iter().any(|reason| reason == "missing_approval:governance"));
}

#[test]
fn failed_readiness_gate_rejects() {
    let h = harness();
    let manifest = publish_release(
        &h,
        "rel-gates",
        release_payload(Some(1), &[("smoke", "PASS"), ("load", "FAIL")]),
    );
    let mut policy = permissive_policy();
    policy.required_readiness_gates.push("load".to_string());
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &policy, &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Reject);
    assert!(decision.reasons.iter().any(|reason| reason == "readiness_gate_failed:load"));
}

#[test]
fn disallowed_waivers_reject_when_manifest_relies_on_them() {
    let h = harness();
    let now = Timestamp::from_unix_millis(EPOCH);
    let waiver = governance_core::Waiver {
        waiver_id: "w-load-gap".into(),
        tenant: TenantId::new("acme").expect("tenant"),
        scope: governance_core::WaiverScope::Class {
            class: ArtifactClass::ReleaseManifest,
        },
        owner: "owner@acme".into(),
        justification: "load environment unavailable".to_string(),
        mitigation: "canary rollout".to_string(),
        created_at: now,
        expires_at: now.plus_millis(30 * DAY_MS),
        status: governance_core::WaiverStatus::Proposed,
        advisory_refs: Vec::new(),
    };
    h.registry.propose_waiver(waiver).expect("propose");
    h.registry
        .approve_waiver(&"w-load-gap".into(), &"governance".into(), &"gov@acme".into())
        .expect("approve");

    let kos = publish_kos(&h, "acme", "rel-waiver-kos");
    let mut draft = manifest_draft(
        ArtifactClass::ReleaseManifest,
        "acme",
        "rel-waiver",
        "1.0.0",
        ChangeImpact::Patch,
        vec![pin(&kos)],
    );
    draft.waivers = vec!["w-load-gap".into()];
    let proposal = ready_proposal(
        &h.registry,
        draft,
        release_payload(Some(1), &[("smoke", "PASS")]),
    );
    let manifest = h.registry.publish(proposal).expect("publish");

    let mut policy = permissive_policy();
    policy.allow_waivers = false;
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &policy, &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Reject);
    assert!(decision.reasons.iter().any(|reason| reason == "waivers_not_allowed"));

    // With waivers allowed and the waiver valid, the same release passes.
    let decision = h
        .registry
        .evaluate_release(&manifest.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .expect("evaluate");
    assert_eq!(decision.decision, GateOutcome::Approve);
}

#[test]
fn non_release_artifact_cannot_be_gated() {
    let h = harness();
    let kos = publish_kos(&h, "acme", "plain-kos");
    let err = h
        .registry
        .evaluate_release(&kos.artifact_id, &permissive_policy(), &"deploy@acme".into())
        .unwrap_err();
    assert_eq!(err.code, governance_core::ErrorCode::SchemaViolation);
}
