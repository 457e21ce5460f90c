// crates/governance-core/src/runtime/registry.rs
// ============================================================================
// Module: Governance Registry Facade
// Description: Atomic publish, rollback, release gating, and waiver lifecycle.
// Purpose: Enforce every registry invariant at the single commit point.
// Dependencies: crate::core, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! [`GovernanceRegistry`] is the stateful facade every surface talks to. The
//! publish transaction re-verifies the payload hash, checks upstream
//! publishability, runs the versioner and waiver checks, verifies the
//! manifest signature, and only then commits to the store, the lineage index,
//! and the event journal. Failures before the store insert abort with a typed
//! error and leave nothing behind; after the insert the operation is final.
//! Rollback is warn-only: descendants receive warning events, never cascaded
//! rollbacks.
//!
//! Security posture: proposals, manifests, and payloads are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Instant;

use serde_json::json;

use crate::core::artifact::ArtifactClass;
use crate::core::artifact::ArtifactStatus;
use crate::core::artifact::Manifest;
use crate::core::error::GovernanceError;
use crate::core::event::EventDraft;
use crate::core::event::EventKind;
use crate::core::hashing;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::identifiers::WaiverId;
use crate::core::lineage::LineageGraph;
use crate::core::release;
use crate::core::release::GateDecision;
use crate::core::release::GatePolicy;
use crate::core::release::ReleasePayload;
use crate::core::schema::SchemaRegistry;
use crate::core::signing::Ed25519Signer;
use crate::core::signing::SigningAuthority;
use crate::core::telemetry::METRIC_ARTIFACT_PUBLISH_LATENCY_MS;
use crate::core::telemetry::METRIC_ARTIFACT_PUBLISH_TOTAL;
use crate::core::telemetry::METRIC_ROLLBACK_TOTAL;
use crate::core::telemetry::METRIC_WAIVER_EXPIRING_7D;
use crate::core::telemetry::MetricSample;
use crate::core::telemetry::OpRecord;
use crate::core::telemetry::OpStatus;
use crate::core::version;
use crate::core::waiver::Waiver;
use crate::core::waiver::WaiverManager;
use crate::core::waiver::WaiverTransition;
use crate::interfaces::RegistryServices;
use crate::runtime::publish::Proposal;
use crate::runtime::publish::ProposalStage;
use crate::runtime::publish::signable_manifest_bytes;

// ============================================================================
// SECTION: Registry Policy
// ============================================================================

/// Registry-wide policy knobs loaded at startup.
///
/// # Invariants
/// - License tags are compared case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct RegistryPolicy {
    /// License tags that block publication outright.
    pub forbidden_license_tags: BTreeSet<String>,
}

// ============================================================================
// SECTION: Registry Facade
// ============================================================================

/// Stateful registry facade enforcing publish, rollback, and gate semantics.
///
/// # Invariants
/// - Publishes serialize under the publish mutex so version computation and
///   insertion are atomic per workspace.
/// - The lineage cache is updated on every publish and rebuilt on startup.
pub struct GovernanceRegistry {
    /// Injected storage, clock, and telemetry services.
    services: RegistryServices,
    /// Manifest signing authority.
    signer: Ed25519Signer,
    /// Per-class payload schemas.
    schemas: SchemaRegistry,
    /// Waiver lifecycle manager (event-sourced).
    waivers: WaiverManager,
    /// Lineage index cache.
    lineage: Mutex<LineageGraph>,
    /// Registry-wide policy knobs.
    policy: RegistryPolicy,
    /// Publish serialization lock.
    publish_lock: Mutex<()>,
}

impl GovernanceRegistry {
    /// Builds a registry facade, rebuilding lineage and waivers from storage.
    ///
    /// # Errors
    ///
    /// Returns a [`GovernanceError`] when the schema registry fails to
    /// compile or startup replay fails.
    pub fn new(
        services: RegistryServices,
        signer: Ed25519Signer,
        policy: RegistryPolicy,
    ) -> Result<Self, GovernanceError> {
        let schemas = SchemaRegistry::new()?;
        let manifests = services.store.list_manifests()?;
        let lineage = LineageGraph::rebuild(manifests.iter());
        let registry = Self {
            services,
            signer,
            schemas,
            waivers: WaiverManager::new(),
            lineage: Mutex::new(lineage),
            policy,
            publish_lock: Mutex::new(()),
        };
        registry.rebuild_waivers()?;
        Ok(registry)
    }

    /// Returns the schema registry for proposal construction.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Returns the signing authority for proposal signing.
    #[must_use]
    pub const fn signer(&self) -> &Ed25519Signer {
        &self.signer
    }

    /// Returns the injected services aggregate.
    #[must_use]
    pub const fn services(&self) -> &RegistryServices {
        &self.services
    }

    // ========================================================================
    // SECTION: Publish
    // ========================================================================

    /// Atomically publishes a signed proposal.
    ///
    /// Re-publishing a byte-identical payload with identical metadata returns
    /// the already-committed manifest without creating a new version.
    ///
    /// # Errors
    ///
    /// Returns the taxonomy error for the first violated invariant; nothing
    /// is committed on failure.
    pub fn publish(&self, proposal: Proposal) -> Result<Manifest, GovernanceError> {
        let started = Instant::now();
        let tenant = proposal.manifest.tenant.clone();
        let trace_id = TraceId::generate();
        let result = self.publish_inner(proposal);
        self.record_op(
            Some(tenant),
            "publish_pipeline",
            "publish",
            &result,
            started,
            trace_id,
        );
        if result.is_ok() {
            self.services
                .telemetry
                .record_metric(&MetricSample::counter(METRIC_ARTIFACT_PUBLISH_TOTAL, 1));
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.services.telemetry.record_metric(&MetricSample::histogram(
                METRIC_ARTIFACT_PUBLISH_LATENCY_MS,
                elapsed,
            ));
        }
        result
    }

    /// Publish transaction body, serialized under the publish lock.
    fn publish_inner(&self, proposal: Proposal) -> Result<Manifest, GovernanceError> {
        if proposal.stage != ProposalStage::Signed {
            return Err(GovernanceError::policy_violation(format!(
                "publish requires a signed proposal; proposal is {}",
                proposal.stage
            )));
        }
        if proposal.audit_passed != Some(true) {
            return Err(GovernanceError::policy_violation(
                "publish requires a passing audit record",
            ));
        }
        let manifest = &proposal.manifest;
        if self.policy.forbidden_license_tags.contains(&manifest.license_tag) {
            return Err(GovernanceError::licensing_block(format!(
                "license tag {} is forbidden by the active policy pack",
                manifest.license_tag
            )));
        }

        let _guard = self.lock_publish();

        // Re-verify the payload hash inside the transaction.
        let recomputed = hashing::hash_canonical_json(manifest.hash.algorithm, &proposal.payload)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        if recomputed != manifest.hash {
            return Err(GovernanceError::nondeterministic(format!(
                "payload re-hashes to {} but the proposal was hashed as {}",
                recomputed.value, manifest.hash.value
            )));
        }

        // Idempotent replay: identical payload and metadata returns the
        // committed manifest without a new version.
        let latest = self.services.store.latest_manifest(
            manifest.class,
            &manifest.tenant,
            &manifest.slug,
        )?;
        if let Some(existing) = &latest
            && existing.hash == manifest.hash
            && existing.title == manifest.title
            && existing.summary == manifest.summary
            && existing.change_impact == manifest.change_impact
            && existing.upstream == manifest.upstream
        {
            return Ok(existing.clone());
        }

        // Upstream pins must resolve to publishable artifacts at pin hash.
        for pin in &manifest.upstream {
            let upstream = self.services.store.get_manifest(&pin.artifact_id).map_err(|_| {
                GovernanceError::source_unavailable(format!(
                    "upstream {} is not present in the registry",
                    pin.artifact_id
                ))
            })?;
            let status = self.services.store.status(&pin.artifact_id)?;
            if !status.is_publishable() {
                return Err(GovernanceError::source_unavailable(format!(
                    "upstream {} is {status} and cannot be pinned",
                    pin.artifact_id
                )));
            }
            if upstream.hash != pin.hash {
                return Err(GovernanceError::stale_snapshot(format!(
                    "upstream {} pin hash {} does not match committed hash {}",
                    pin.artifact_id, pin.hash.value, upstream.hash.value
                )));
            }
        }

        // Versioner and approval requirements.
        let prior_version = latest.as_ref().map(|existing| &existing.version);
        version::check_declared(&manifest.version, prior_version, manifest.change_impact)?;
        version::check_approvals(
            manifest.change_impact,
            &manifest.approvals,
            &manifest.change_reason_code,
        )?;

        // Waiver validity at publish time.
        let now = self.services.clock.now();
        self.waivers.validate_for_publish(&manifest.waivers, now)?;

        // Defense-in-depth acyclicity check.
        let pins: Vec<ArtifactId> =
            manifest.upstream.iter().map(|pin| pin.artifact_id).collect();
        self.lock_lineage().check_acyclic(manifest.artifact_id, &pins)?;

        // Signature verification over canonical manifest bytes.
        let signature = manifest
            .signature
            .as_ref()
            .ok_or_else(|| GovernanceError::policy_violation("manifest is unsigned"))?;
        let signable = signable_manifest_bytes(manifest)?;
        let verified = self
            .signer
            .verify(&signable, signature)
            .map_err(|err| GovernanceError::policy_violation(err.to_string()))?;
        if !verified {
            return Err(GovernanceError::policy_violation(
                "manifest signature does not verify",
            ));
        }

        // Commit point: store insert, lineage index, event append.
        self.services.store.put(manifest, &proposal.payload)?;
        self.lock_lineage().insert(manifest);
        self.append_event(
            &manifest.tenant,
            EventDraft {
                actor: manifest.creator.clone(),
                kind: EventKind::ArtifactPublished,
                subject_id: manifest.artifact_id.to_string(),
                payload: json!({
                    "key": manifest.key().to_string(),
                    "hash": manifest.hash,
                }),
            },
        )?;
        if manifest.class == ArtifactClass::PromptPack {
            self.append_event(
                &manifest.tenant,
                EventDraft {
                    actor: manifest.creator.clone(),
                    kind: EventKind::PromptPublished,
                    subject_id: manifest.artifact_id.to_string(),
                    payload: json!({ "key": manifest.key().to_string() }),
                },
            )?;
        }
        Ok(proposal.manifest)
    }

    // ========================================================================
    // SECTION: Rollback
    // ========================================================================

    /// Rolls back an artifact: status side-row, rollback event, and warning
    /// events for every descendant. Warn-only; descendants never cascade.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the artifact is unknown.
    pub fn rollback(
        &self,
        id: &ArtifactId,
        actor: &ActorId,
        reason: &str,
    ) -> Result<Vec<ArtifactId>, GovernanceError> {
        let started = Instant::now();
        let manifest = self.services.store.get_manifest(id)?;
        let tenant = manifest.tenant.clone();
        let trace_id = TraceId::generate();
        let result = self.rollback_inner(&manifest, actor, reason);
        self.record_op(
            Some(tenant),
            "publish_pipeline",
            "rollback",
            &result,
            started,
            trace_id,
        );
        if result.is_ok() {
            self.services.telemetry.record_metric(&MetricSample::counter(METRIC_ROLLBACK_TOTAL, 1));
        }
        result
    }

    /// Rollback transaction body.
    fn rollback_inner(
        &self,
        manifest: &Manifest,
        actor: &ActorId,
        reason: &str,
    ) -> Result<Vec<ArtifactId>, GovernanceError> {
        self.services.store.mark_status(
            &manifest.artifact_id,
            ArtifactStatus::RolledBack,
            reason,
        )?;
        self.append_event(
            &manifest.tenant,
            EventDraft {
                actor: actor.clone(),
                kind: EventKind::ArtifactRolledBack,
                subject_id: manifest.artifact_id.to_string(),
                payload: json!({ "reason": reason }),
            },
        )?;
        let impacted = self.lock_lineage().rollback_impact(&manifest.artifact_id);
        for descendant in &impacted {
            self.append_event(
                &manifest.tenant,
                EventDraft {
                    actor: actor.clone(),
                    kind: EventKind::UpstreamRolledBack,
                    subject_id: descendant.to_string(),
                    payload: json!({
                        "rolled_back_upstream": manifest.artifact_id.to_string(),
                        "reason": reason,
                    }),
                },
            )?;
        }
        Ok(impacted)
    }

    // ========================================================================
    // SECTION: Release Gate
    // ========================================================================

    /// Evaluates a release manifest against a gate policy and records the
    /// `deployment_gate` event.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` when the manifest or payload is missing,
    /// and `SCHEMA_VIOLATION` when the artifact is not a release manifest.
    pub fn evaluate_release(
        &self,
        manifest_id: &ArtifactId,
        policy: &GatePolicy,
        actor: &ActorId,
    ) -> Result<GateDecision, GovernanceError> {
        let started = Instant::now();
        let manifest = self.services.store.get_manifest(manifest_id)?;
        if manifest.class != ArtifactClass::ReleaseManifest {
            return Err(GovernanceError::schema_violation(format!(
                "artifact {manifest_id} is a {} and cannot be release-gated",
                manifest.class
            )));
        }
        let raw = self.services.store.get_payload(&manifest.hash)?;
        let payload: ReleasePayload = serde_json::from_value(raw)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        let resolved: Vec<(String, Option<Waiver>)> = manifest
            .waivers
            .iter()
            .map(|waiver_id| (waiver_id.to_string(), self.waivers.get(waiver_id)))
            .collect();
        let now = self.services.clock.now();
        let trace_id = TraceId::generate();
        let decision =
            release::evaluate(&manifest, &payload, &resolved, policy, now, trace_id.clone());
        self.append_event(
            &manifest.tenant,
            EventDraft {
                actor: actor.clone(),
                kind: EventKind::DeploymentGate,
                subject_id: manifest.artifact_id.to_string(),
                payload: release::decision_event_payload(&decision),
            },
        )?;
        let result: Result<(), GovernanceError> = Ok(());
        self.record_op(
            Some(manifest.tenant),
            "release_gate",
            "evaluate",
            &result,
            started,
            trace_id,
        );
        Ok(decision)
    }

    // ========================================================================
    // SECTION: Waivers
    // ========================================================================

    /// Proposes a waiver and records `waiver_proposed`.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the waiver is malformed or duplicated.
    pub fn propose_waiver(&self, waiver: Waiver) -> Result<Waiver, GovernanceError> {
        let waiver = self.waivers.propose(waiver)?;
        self.append_waiver_event(&waiver, EventKind::WaiverProposed)?;
        Ok(waiver)
    }

    /// Approves a waiver (requires the `governance` role) and records
    /// `waiver_granted`.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the approver role is wrong or the
    /// waiver is not in `PROPOSED`.
    pub fn approve_waiver(
        &self,
        waiver_id: &WaiverId,
        approver_role: &RoleName,
        approver: &ActorId,
    ) -> Result<Waiver, GovernanceError> {
        let waiver = self.waivers.approve(waiver_id, approver_role)?;
        self.append_event(
            &waiver.tenant,
            EventDraft {
                actor: approver.clone(),
                kind: EventKind::WaiverGranted,
                subject_id: waiver.waiver_id.to_string(),
                payload: waiver_snapshot(&waiver)?,
            },
        )?;
        Ok(waiver)
    }

    /// Revokes a waiver and records `waiver_revoked`.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the waiver is unknown or terminal.
    pub fn revoke_waiver(
        &self,
        waiver_id: &WaiverId,
        actor: &ActorId,
    ) -> Result<Waiver, GovernanceError> {
        let waiver = self.waivers.revoke(waiver_id)?;
        self.append_event(
            &waiver.tenant,
            EventDraft {
                actor: actor.clone(),
                kind: EventKind::WaiverRevoked,
                subject_id: waiver.waiver_id.to_string(),
                payload: waiver_snapshot(&waiver)?,
            },
        )?;
        Ok(waiver)
    }

    /// Returns a waiver by identifier.
    #[must_use]
    pub fn get_waiver(&self, waiver_id: &WaiverId) -> Option<Waiver> {
        self.waivers.get(waiver_id)
    }

    /// Sweeps waivers: expires due ones and flags the seven-day window.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when a transition event cannot be appended.
    pub fn sweep_waivers(&self, sweeper: &ActorId) -> Result<usize, GovernanceError> {
        let now = self.services.clock.now();
        let transitions = self.waivers.sweep(now);
        let mut expiring_soon = 0u64;
        for transition in &transitions {
            match transition {
                WaiverTransition::Expired(waiver) => {
                    self.append_event(
                        &waiver.tenant,
                        EventDraft {
                            actor: sweeper.clone(),
                            kind: EventKind::WaiverExpired,
                            subject_id: waiver.waiver_id.to_string(),
                            payload: waiver_snapshot(waiver)?,
                        },
                    )?;
                }
                WaiverTransition::ExpiringSoon(waiver) => {
                    expiring_soon += 1;
                    self.append_event(
                        &waiver.tenant,
                        EventDraft {
                            actor: sweeper.clone(),
                            kind: EventKind::WaiverExpiring,
                            subject_id: waiver.waiver_id.to_string(),
                            payload: waiver_snapshot(waiver)?,
                        },
                    )?;
                }
            }
        }
        self.services
            .telemetry
            .record_metric(&MetricSample::gauge(METRIC_WAIVER_EXPIRING_7D, expiring_soon));
        Ok(transitions.len())
    }

    /// Rebuilds the waiver table from the event journals.
    fn rebuild_waivers(&self) -> Result<(), GovernanceError> {
        for tenant in self.services.events.tenants()? {
            let mut from_seq = 1;
            loop {
                let batch = self.services.events.read(&tenant, from_seq, 512)?;
                if batch.is_empty() {
                    break;
                }
                for record in &batch {
                    let is_waiver_kind = matches!(
                        record.kind,
                        EventKind::WaiverProposed
                            | EventKind::WaiverGranted
                            | EventKind::WaiverRevoked
                            | EventKind::WaiverExpired
                    );
                    if is_waiver_kind
                        && let Ok(waiver) =
                            serde_json::from_value::<Waiver>(record.payload.clone())
                    {
                        self.waivers.restore(waiver);
                    }
                    from_seq = record.seq + 1;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // SECTION: Lineage Queries
    // ========================================================================

    /// Returns the transitive upstream closure of an artifact.
    #[must_use]
    pub fn ancestors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.lock_lineage().ancestors(id)
    }

    /// Returns the transitive downstream closure of an artifact.
    #[must_use]
    pub fn descendants(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        self.lock_lineage().descendants(id)
    }

    // ========================================================================
    // SECTION: Internals
    // ========================================================================

    /// Appends an event with the current clock time.
    fn append_event(&self, tenant: &TenantId, draft: EventDraft) -> Result<(), GovernanceError> {
        let ts = self.services.clock.now();
        self.services.events.append(tenant, ts, draft)?;
        Ok(())
    }

    /// Appends a waiver transition event addressed to the waiver's tenant.
    fn append_waiver_event(
        &self,
        waiver: &Waiver,
        kind: EventKind,
    ) -> Result<(), GovernanceError> {
        self.append_event(
            &waiver.tenant,
            EventDraft {
                actor: waiver.owner.clone(),
                kind,
                subject_id: waiver.waiver_id.to_string(),
                payload: waiver_snapshot(waiver)?,
            },
        )
    }

    /// Records a structured operation log line.
    fn record_op<T>(
        &self,
        tenant: Option<TenantId>,
        component: &'static str,
        op: &'static str,
        result: &Result<T, GovernanceError>,
        started: Instant,
        trace_id: TraceId,
    ) {
        let status = if result.is_ok() {
            OpStatus::Ok
        } else {
            OpStatus::Error
        };
        self.services.telemetry.record_op(&OpRecord {
            ts: self.services.clock.now(),
            tenant,
            component,
            op,
            status,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            trace_id,
        });
    }

    /// Locks the lineage cache, recovering from poisoning.
    fn lock_lineage(&self) -> MutexGuard<'_, LineageGraph> {
        self.lineage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the publish serialization mutex, recovering from poisoning.
    fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a waiver snapshot into an event payload.
fn waiver_snapshot(waiver: &Waiver) -> Result<serde_json::Value, GovernanceError> {
    serde_json::to_value(waiver).map_err(|err| GovernanceError::schema_violation(err.to_string()))
}
