// crates/governance-core/src/core/lineage.rs
// ============================================================================
// Module: Lineage Graph
// Description: DAG index over manifest upstream pins.
// Purpose: Serve ancestry, descendant, and rollback-impact queries.
// Dependencies: crate::core::{artifact, error, identifiers}
// ============================================================================

//! ## Overview
//! Lineage is an arena-and-index structure: manifests are the arena, edges
//! are derived from `upstream` pins. Ancestry and descendant queries use
//! iterative BFS with explicit visited sets, never recursion. Because
//! manifests are immutable, cycles are impossible by construction; the cycle
//! check remains as a defense-in-depth invariant. The graph is rebuilt from
//! the store on startup and updated on publish and rollback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use crate::core::artifact::Manifest;
use crate::core::error::GovernanceError;
use crate::core::identifiers::ArtifactId;

// ============================================================================
// SECTION: Lineage Graph
// ============================================================================

/// DAG of artifact dependencies indexed from upstream pins.
///
/// # Invariants
/// - Edge sets are symmetric: `a` lists `b` upstream iff `b` lists `a`
///   downstream.
/// - The graph is acyclic.
#[derive(Debug, Default, Clone)]
pub struct LineageGraph {
    /// Upstream adjacency (node -> pinned upstreams).
    upstream: BTreeMap<ArtifactId, Vec<ArtifactId>>,
    /// Downstream adjacency (node -> dependents).
    downstream: BTreeMap<ArtifactId, Vec<ArtifactId>>,
}

impl LineageGraph {
    /// Creates an empty lineage graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the graph from a manifest arena.
    #[must_use]
    pub fn rebuild<'a>(manifests: impl IntoIterator<Item = &'a Manifest>) -> Self {
        let mut graph = Self::new();
        for manifest in manifests {
            graph.insert(manifest);
        }
        graph
    }

    /// Indexes a manifest's upstream pins into the graph.
    pub fn insert(&mut self, manifest: &Manifest) {
        let pins: Vec<ArtifactId> =
            manifest.upstream.iter().map(|pin| pin.artifact_id).collect();
        for pin in &pins {
            self.downstream.entry(*pin).or_default().push(manifest.artifact_id);
        }
        self.upstream.insert(manifest.artifact_id, pins);
    }

    /// Returns whether the graph knows the artifact.
    #[must_use]
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.upstream.contains_key(id)
    }

    /// Returns the transitive upstream closure of an artifact.
    #[must_use]
    pub fn ancestors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.closure(id, &self.upstream)
    }

    /// Returns the transitive downstream closure of an artifact.
    #[must_use]
    pub fn descendants(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.closure(id, &self.downstream)
    }

    /// Returns the descendants that must be warned when `id` rolls back.
    #[must_use]
    pub fn rollback_impact(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.descendants(id)
    }

    /// Validates that adding a node with the given pins keeps the DAG acyclic.
    ///
    /// Since manifests are immutable this cannot fire in practice; it remains
    /// as a defense-in-depth invariant.
    ///
    /// # Errors
    ///
    /// Returns a `SCHEMA_VIOLATION` [`GovernanceError`] when the candidate
    /// would appear in its own transitive upstream.
    pub fn check_acyclic(
        &self,
        candidate: ArtifactId,
        pins: &[ArtifactId],
    ) -> Result<(), GovernanceError> {
        for pin in pins {
            if *pin == candidate {
                return Err(GovernanceError::schema_violation(format!(
                    "artifact {candidate} pins itself"
                )));
            }
            if self.ancestors(pin).contains(&candidate) {
                return Err(GovernanceError::schema_violation(format!(
                    "artifact {candidate} appears in its own upstream closure via {pin}"
                )));
            }
        }
        Ok(())
    }

    /// Iterative BFS closure over the given adjacency.
    fn closure(
        &self,
        start: &ArtifactId,
        adjacency: &BTreeMap<ArtifactId, Vec<ArtifactId>>,
    ) -> Vec<ArtifactId> {
        let mut visited: BTreeSet<ArtifactId> = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<ArtifactId> = VecDeque::new();
        queue.push_back(*start);
        visited.insert(*start);
        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(&current) {
                for neighbor in neighbors {
                    if visited.insert(*neighbor) {
                        order.push(*neighbor);
                        queue.push_back(*neighbor);
                    }
                }
            }
        }
        order
    }
}
