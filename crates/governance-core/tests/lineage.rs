// crates/governance-core/tests/lineage.rs
// ============================================================================
// Module: Lineage Graph Tests
// Description: BFS closures, cycle defense, and rollback impact.
// ============================================================================
//! ## Overview
//! Exercises the lineage index over a small artifact DAG: transitive
//! ancestor and descendant closures, the defense-in-depth acyclicity check,
//! and rollback impact enumeration.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use governance_core::ArtifactClass;
use governance_core::ArtifactId;
use governance_core::ChangeImpact;
use governance_core::LineageGraph;
use governance_core::Manifest;
use governance_core::UpstreamPin;

mod common;

use common::manifest_draft;

fn node(slug: &str, upstream: Vec<UpstreamPin>) -> Manifest {
    manifest_draft(
        ArtifactClass::CoveragePlan,
        "acme",
        slug,
        "1.0.0",
        ChangeImpact::Patch,
        upstream,
    )
}

fn pin_of(manifest: &Manifest) -> UpstreamPin {
    UpstreamPin {
        artifact_id: manifest.artifact_id,
        hash: manifest.hash.clone(),
    }
}

#[test]
fn closures_cover_transitive_chains() {
    // kos <- plan <- eval
    let kos = node("kos", Vec::new());
    let plan = node("plan", vec![pin_of(&kos)]);
    let eval = node("eval", vec![pin_of(&plan)]);

    let graph = LineageGraph::rebuild([&kos, &plan, &eval]);

    let ancestors = graph.ancestors(&eval.artifact_id);
    assert!(ancestors.contains(&plan.artifact_id));
    assert!(ancestors.contains(&kos.artifact_id));

    let descendants = graph.descendants(&kos.artifact_id);
    assert!(descendants.contains(&plan.artifact_id));
    assert!(descendants.contains(&eval.artifact_id));
}

#[test]
fn diamond_dependencies_are_visited_once() {
    // kos <- (plan_a, plan_b) <- bundle
    let kos = node("kos", Vec::new());
    let plan_a = node("plan-a", vec![pin_of(&kos)]);
    let plan_b = node("plan-b", vec![pin_of(&kos)]);
    let bundle = node("bundle", vec![pin_of(&plan_a), pin_of(&plan_b)]);

    let graph = LineageGraph::rebuild([&kos, &plan_a, &plan_b, &bundle]);

    let ancestors = graph.ancestors(&bundle.artifact_id);
    assert_eq!(ancestors.len(), 3, "kos must appear exactly once");

    let impact = graph.rollback_impact(&kos.artifact_id);
    assert_eq!(impact.len(), 3);
    assert!(impact.contains(&bundle.artifact_id));
}

#[test]
fn leaf_nodes_have_empty_closures() {
    let kos = node("kos", Vec::new());
    let graph = LineageGraph::rebuild([&kos]);
    assert!(graph.ancestors(&kos.artifact_id).is_empty());
    assert!(graph.descendants(&kos.artifact_id).is_empty());
}

#[test]
fn unknown_nodes_yield_empty_closures() {
    let graph = LineageGraph::new();
    let ghost = ArtifactId::generate();
    assert!(graph.ancestors(&ghost).is_empty());
    assert!(graph.descendants(&ghost).is_empty());
}

#[test]
fn self_pin_is_rejected() {
    let graph = LineageGraph::new();
    let candidate = ArtifactId::generate();
    let err = graph.check_acyclic(candidate, &[candidate]).unwrap_err();
    assert_eq!(err.code, governance_core::ErrorCode::SchemaViolation);
}

#[test]
fn cycle_through_existing_edges_is_rejected() {
    // plan pins kos; a hypothetical new revision of kos pinning plan would
    // close a cycle and must be rejected.
    let kos = node("kos", Vec::new());
    let plan = node("plan", vec![pin_of(&kos)]);
    let graph = LineageGraph::rebuild([&kos, &plan]);

    let err = graph.check_acyclic(kos.artifact_id, &[plan.artifact_id]).unwrap_err();
    assert_eq!(err.code, governance_core::ErrorCode::SchemaViolation);
}

#[test]
fn acyclic_candidate_passes_defense_check() {
    let kos = node("kos", Vec::new());
    let plan = node("plan", vec![pin_of(&kos)]);
    let graph = LineageGraph::rebuild([&kos, &plan]);

    let fresh = ArtifactId::generate();
    graph.check_acyclic(fresh, &[plan.artifact_id]).expect("no cycle");
}
