// crates/governance-core/src/interfaces/mod.rs
// ============================================================================
// Module: Governance Interfaces
// Description: Backend-agnostic interfaces for artifact, event, and job state.
// Purpose: Define the storage contract surfaces used by the registry runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the registry integrates with durable storage without
//! embedding backend details. Implementations must be deterministic and fail
//! closed: hash mismatches and chain breaks surface as
//! `NONDETERMINISTIC_OUTPUT`, missing references as `SOURCE_UNAVAILABLE`.
//! There is no process-global state; every operation receives an explicit
//! [`RegistryServices`] aggregate.
//!
//! Security posture: stored bytes are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::core::artifact::ArtifactClass;
use crate::core::artifact::ArtifactStatus;
use crate::core::artifact::Manifest;
use crate::core::error::GovernanceError;
use crate::core::event::EventDraft;
use crate::core::event::EventRecord;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::Slug;
use crate::core::identifiers::TenantId;
use crate::core::job::JobRecord;
use crate::core::telemetry::Telemetry;
use crate::core::time::Clock;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Content-addressed artifact and manifest store.
///
/// Implementations own the `payloads` and `manifests` tables exclusively.
pub trait ArtifactStore: Send + Sync {
    /// Atomically inserts a manifest and its payload.
    ///
    /// # Errors
    ///
    /// Returns `SCHEMA_VIOLATION` when the payload hash disagrees with the
    /// manifest, `STALE_SNAPSHOT` when the `(class, tenant, slug, version)`
    /// key already exists, or a storage failure.
    fn put(&self, manifest: &Manifest, payload: &Value) -> Result<(), GovernanceError>;

    /// Loads a manifest by artifact identifier.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the identifier is unknown.
    fn get_manifest(&self, id: &ArtifactId) -> Result<Manifest, GovernanceError>;

    /// Loads a payload by content hash, re-verifying the hash on return.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the hash is unknown and
    /// `NONDETERMINISTIC_OUTPUT` when the stored bytes no longer match it.
    fn get_payload(&self, hash: &HashDigest) -> Result<Value, GovernanceError>;

    /// Returns the lifecycle status of an artifact.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the identifier is unknown.
    fn status(&self, id: &ArtifactId) -> Result<ArtifactStatus, GovernanceError>;

    /// Writes a status side-row; never mutates the manifest.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the identifier is unknown.
    fn mark_status(
        &self,
        id: &ArtifactId,
        status: ArtifactStatus,
        reason: &str,
    ) -> Result<(), GovernanceError>;

    /// Returns the highest-version manifest for a slug series, when any.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the index cannot be read.
    fn latest_manifest(
        &self,
        class: ArtifactClass,
        tenant: &TenantId,
        slug: &Slug,
    ) -> Result<Option<Manifest>, GovernanceError>;

    /// Lists every stored manifest (lineage rebuild on startup).
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the manifest table cannot be scanned.
    fn list_manifests(&self) -> Result<Vec<Manifest>, GovernanceError>;
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Append-only, HMAC-chained, per-tenant event journal.
///
/// Implementations own the journal exclusively; appends serialize under a
/// per-tenant mutex and failed appends assign no sequence number.
pub trait EventLog: Send + Sync {
    /// Appends a draft, assigning the next sequence and chain link.
    ///
    /// # Errors
    ///
    /// Returns `NONDETERMINISTIC_OUTPUT` when the tail of the journal fails
    /// verification, or a storage failure when the append cannot be made
    /// durable.
    fn append(
        &self,
        tenant: &TenantId,
        ts: Timestamp,
        draft: EventDraft,
    ) -> Result<EventRecord, GovernanceError>;

    /// Streams events by sequence range (`from_seq` inclusive).
    ///
    /// # Errors
    ///
    /// Returns `NONDETERMINISTIC_OUTPUT` when any returned link fails
    /// verification.
    fn read(
        &self,
        tenant: &TenantId,
        from_seq: u64,
        limit: usize,
    ) -> Result<Vec<EventRecord>, GovernanceError>;

    /// Returns the latest assigned sequence for a tenant (zero when empty).
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the journal cannot be read.
    fn latest_seq(&self, tenant: &TenantId) -> Result<u64, GovernanceError>;

    /// Re-verifies the whole chain for a tenant, returning the link count.
    ///
    /// # Errors
    ///
    /// Returns `NONDETERMINISTIC_OUTPUT` on the first broken link.
    fn verify(&self, tenant: &TenantId) -> Result<u64, GovernanceError>;

    /// Lists tenants with at least one journal entry.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the journal set cannot be enumerated.
    fn tenants(&self) -> Result<Vec<TenantId>, GovernanceError>;
}

// ============================================================================
// SECTION: Job Log
// ============================================================================

/// Durable append log of job record transitions.
///
/// Replay folds transitions by job identifier so unfinished jobs can be
/// recovered and quota counters rebuilt after a restart.
pub trait JobLog: Send + Sync {
    /// Appends a job record snapshot.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the append cannot be made durable.
    fn append(&self, record: &JobRecord) -> Result<(), GovernanceError>;

    /// Replays the log, returning the latest state of every job.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the log cannot be read.
    fn replay(&self) -> Result<Vec<JobRecord>, GovernanceError>;

    /// Compacts the log down to the latest state per job.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the rewrite cannot be completed.
    fn compact(&self) -> Result<(), GovernanceError>;
}

// ============================================================================
// SECTION: Services Aggregate
// ============================================================================

/// Explicit, injected service aggregate passed into every registry operation.
///
/// # Invariants
/// - No process-global state exists besides the event-log secret loaded at
///   startup; all collaborators arrive through this aggregate.
#[derive(Clone)]
pub struct RegistryServices {
    /// Artifact and manifest store.
    pub store: Arc<dyn ArtifactStore>,
    /// Event journal.
    pub events: Arc<dyn EventLog>,
    /// Injected time source.
    pub clock: Arc<dyn Clock>,
    /// Telemetry sink.
    pub telemetry: Arc<dyn Telemetry>,
}
