// crates/governance-core/src/core/event.rs
// ============================================================================
// Module: Governance Events
// Description: HMAC-chained, per-tenant governance event records.
// Purpose: Define the journal entry shape and the chain computation rules.
// Dependencies: crate::core::{hashing, identifiers, signing, time}, serde
// ============================================================================

//! ## Overview
//! Every registry transition appends a governance event. Events are chained
//! per tenant: `hmac = HMAC(secret, prev_hmac || canonical(event-minus-hmac))`
//! and `seq` is strictly monotonic starting at 1. The chain is re-verified on
//! read and on journal replay; any broken link fails closed as
//! `NONDETERMINISTIC_OUTPUT`. Events store only `subject_id`; they never
//! embed manifests, so the artifact and event stores stay acyclic.
//!
//! Security posture: journal bytes are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing;
use crate::core::hashing::HashError;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::TenantId;
use crate::core::signing::EventChainMac;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Chain seed used as `prev_hmac` for the first event of a tenant.
pub const GENESIS_PREV_HMAC: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Governance event kinds.
///
/// # Invariants
/// - Wire form is the lowercase snake_case kind label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Artifact committed by the publish pipeline.
    ArtifactPublished,
    /// Artifact rolled back to a terminal state.
    ArtifactRolledBack,
    /// Downstream warning that a pinned upstream was rolled back.
    UpstreamRolledBack,
    /// Waiver proposed.
    WaiverProposed,
    /// Waiver approved by governance.
    WaiverGranted,
    /// Waiver revoked by its owner or governance.
    WaiverRevoked,
    /// Waiver enters its final seven days of validity.
    WaiverExpiring,
    /// Waiver expired by the sweeper.
    WaiverExpired,
    /// Prompt pack published.
    PromptPublished,
    /// Job accepted into the queue.
    ServiceJobEnqueued,
    /// Job finished successfully.
    ServiceJobCompleted,
    /// Job failed terminally.
    ServiceJobFailed,
    /// Job refused by the quota manager.
    ServiceJobQuotaExceeded,
    /// Release gate decision recorded.
    DeploymentGate,
}

impl EventKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArtifactPublished => "artifact_published",
            Self::ArtifactRolledBack => "artifact_rolled_back",
            Self::UpstreamRolledBack => "upstream_rolled_back",
            Self::WaiverProposed => "waiver_proposed",
            Self::WaiverGranted => "waiver_granted",
            Self::WaiverRevoked => "waiver_revoked",
            Self::WaiverExpiring => "waiver_expiring",
            Self::WaiverExpired => "waiver_expired",
            Self::PromptPublished => "prompt_published",
            Self::ServiceJobEnqueued => "service_job_enqueued",
            Self::ServiceJobCompleted => "service_job_completed",
            Self::ServiceJobFailed => "service_job_failed",
            Self::ServiceJobQuotaExceeded => "service_job_quota_exceeded",
            Self::DeploymentGate => "deployment_gate",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Event payload supplied by a producer before sequencing and chaining.
///
/// # Invariants
/// - `subject_id` identifies the artifact, waiver, or job the event concerns.
/// - `payload` carries structured detail; it is never interpreted by the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Acting identity.
    pub actor: ActorId,
    /// Event kind.
    pub kind: EventKind,
    /// Identifier of the subject the event describes.
    pub subject_id: String,
    /// Structured event payload.
    pub payload: Value,
}

/// Sealed, chained journal entry.
///
/// # Invariants
/// - `seq` is strictly monotonic per tenant, starting at 1.
/// - `hmac` covers `prev_hmac || canonical(event-minus-hmac)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Per-tenant sequence number.
    pub seq: u64,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Event timestamp.
    pub ts: Timestamp,
    /// Acting identity.
    pub actor: ActorId,
    /// Event kind.
    pub kind: EventKind,
    /// Identifier of the subject the event describes.
    pub subject_id: String,
    /// Structured event payload.
    pub payload: Value,
    /// Chain link of the preceding event (genesis seed for `seq == 1`).
    pub prev_hmac: String,
    /// Chain link over this event.
    pub hmac: String,
}

impl EventRecord {
    /// Returns the canonical bytes of this event minus its `hmac` field.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonical serialization fails.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, HashError> {
        let mut value = serde_json::to_value(self)
            .map_err(|err| HashError::Canonicalization(err.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove("hmac");
        }
        hashing::canonical_json_bytes(&value)
    }
}

// ============================================================================
// SECTION: Chain Computation
// ============================================================================

/// Event chain verification errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Sequence numbers are not contiguous.
    #[error("event sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Sequence number actually found.
        found: u64,
    },
    /// `prev_hmac` does not match the preceding event's `hmac`.
    #[error("event chain link mismatch at seq {seq}")]
    LinkMismatch {
        /// Sequence number of the broken link.
        seq: u64,
    },
    /// Recomputed HMAC does not match the stored value.
    #[error("event hmac mismatch at seq {seq}")]
    MacMismatch {
        /// Sequence number of the mismatching event.
        seq: u64,
    },
    /// Canonical serialization failed during verification.
    #[error("event canonicalization failed at seq {seq}: {message}")]
    Canonicalization {
        /// Sequence number of the failing event.
        seq: u64,
        /// Failure description.
        message: String,
    },
}

/// Seals a draft into a chained [`EventRecord`].
///
/// # Errors
///
/// Returns [`HashError`] when the draft cannot be canonicalized.
pub fn seal_event(
    mac: &EventChainMac,
    tenant: TenantId,
    seq: u64,
    ts: Timestamp,
    prev_hmac: &str,
    draft: EventDraft,
) -> Result<EventRecord, HashError> {
    let mut record = EventRecord {
        seq,
        tenant,
        ts,
        actor: draft.actor,
        kind: draft.kind,
        subject_id: draft.subject_id,
        payload: draft.payload,
        prev_hmac: prev_hmac.to_string(),
        hmac: String::new(),
    };
    let signable = record.signable_bytes()?;
    record.hmac = mac.chain_link(prev_hmac, &signable);
    Ok(record)
}

/// Verifies a contiguous run of events against the chain rules.
///
/// `prior` carries the `(seq, hmac)` of the event immediately preceding the
/// run, or `None` when the run starts at the genesis of the tenant's journal.
///
/// # Errors
///
/// Returns [`ChainError`] on the first broken invariant.
pub fn verify_chain(
    mac: &EventChainMac,
    prior: Option<(u64, &str)>,
    events: &[EventRecord],
) -> Result<(), ChainError> {
    let (mut expected_seq, mut expected_prev) = match prior {
        Some((seq, hmac)) => (seq + 1, hmac.to_string()),
        None => (1, GENESIS_PREV_HMAC.to_string()),
    };
    for event in events {
        if event.seq != expected_seq {
            return Err(ChainError::SequenceGap {
                expected: expected_seq,
                found: event.seq,
            });
        }
        if event.prev_hmac != expected_prev {
            return Err(ChainError::LinkMismatch {
                seq: event.seq,
            });
        }
        let signable = event.signable_bytes().map_err(|err| ChainError::Canonicalization {
            seq: event.seq,
            message: err.to_string(),
        })?;
        if !mac.verify_link(&event.prev_hmac, &signable, &event.hmac) {
            return Err(ChainError::MacMismatch {
                seq: event.seq,
            });
        }
        expected_seq += 1;
        expected_prev.clone_from(&event.hmac);
    }
    Ok(())
}
