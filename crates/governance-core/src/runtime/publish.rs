// crates/governance-core/src/runtime/publish.rs
// ============================================================================
// Module: Proposal State Machine
// Description: Propose, build, audit, approve, and sign stages for publishes.
// Purpose: Enforce stage ordering before the atomic publish transaction.
// Dependencies: crate::core::{artifact, error, hashing, schema, signing, version}
// ============================================================================

//! ## Overview
//! A proposal walks propose → build → audit → approve → sign before the
//! registry will accept it for publication. Stage skipping is rejected with
//! `POLICY_VIOLATION`. The proposal carries the candidate manifest and the
//! payload; the content hash is computed at propose time and re-verified
//! inside the publish transaction, so a payload swapped after proposing is
//! caught as `NONDETERMINISTIC_OUTPUT`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::core::artifact::Approval;
use crate::core::artifact::EnvironmentFingerprint;
use crate::core::artifact::Manifest;
use crate::core::error::GovernanceError;
use crate::core::hashing;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::identifiers::KeyId;
use crate::core::schema::SchemaRegistry;
use crate::core::signing::SigningAuthority;
use crate::core::version;

// ============================================================================
// SECTION: Proposal Stage
// ============================================================================

/// Stages of an in-flight proposal.
///
/// # Invariants
/// - Stages advance strictly in declaration order; skipping is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProposalStage {
    /// Schema-validated, canonicalized, and hashed.
    Proposed,
    /// Environment fingerprint attached by the producer.
    Built,
    /// Class-specific audit recorded.
    Audited,
    /// Approvals required by the change impact collected.
    Approved,
    /// Canonical manifest bytes signed.
    Signed,
}

impl ProposalStage {
    /// Returns the stable label for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Built => "built",
            Self::Audited => "audited",
            Self::Approved => "approved",
            Self::Signed => "signed",
        }
    }
}

impl fmt::Display for ProposalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Proposal
// ============================================================================

/// In-flight publish proposal.
///
/// # Invariants
/// - `manifest.hash` equals the canonical hash of `payload` from propose time.
/// - `manifest.signature` is `Some` exactly when the stage is `Signed`.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Candidate manifest.
    pub manifest: Manifest,
    /// Candidate payload.
    pub payload: Value,
    /// Current stage.
    pub stage: ProposalStage,
    /// Audit outcome, recorded at the audit stage.
    pub audit_passed: Option<bool>,
}

impl Proposal {
    /// Creates a proposal: validates the payload schema, canonicalizes, and
    /// computes the content hash.
    ///
    /// # Errors
    ///
    /// Returns `SCHEMA_VIOLATION` when the payload fails its class schema,
    /// cannot be canonicalized, or the upstream set is empty for a non-root
    /// class.
    pub fn propose(
        schemas: &SchemaRegistry,
        mut manifest: Manifest,
        payload: Value,
    ) -> Result<Self, GovernanceError> {
        schemas.validate(manifest.class, &payload)?;
        if manifest.upstream.is_empty() && !manifest.class.is_root() {
            return Err(GovernanceError::schema_violation(format!(
                "class {} requires at least one upstream pin",
                manifest.class
            )));
        }
        manifest.hash = hashing::hash_canonical_json(DEFAULT_HASH_ALGORITHM, &payload)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        manifest.signature = None;
        Ok(Self {
            manifest,
            payload,
            stage: ProposalStage::Proposed,
            audit_passed: None,
        })
    }

    /// Attaches the build environment fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the proposal is not at `Proposed`.
    pub fn attach_build(
        &mut self,
        fingerprint: EnvironmentFingerprint,
    ) -> Result<(), GovernanceError> {
        self.expect_stage(ProposalStage::Proposed)?;
        self.manifest.environment_fingerprint = fingerprint;
        self.stage = ProposalStage::Built;
        Ok(())
    }

    /// Records the class-specific audit outcome.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the proposal is not at `Built`.
    pub fn record_audit(&mut self, passed: bool) -> Result<(), GovernanceError> {
        self.expect_stage(ProposalStage::Built)?;
        self.audit_passed = Some(passed);
        self.stage = ProposalStage::Audited;
        Ok(())
    }

    /// Adds a signed approval; advances to `Approved` once the change
    /// impact's requirement is satisfied.
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the proposal is before `Audited` or
    /// already signed.
    pub fn approve(&mut self, approval: Approval) -> Result<(), GovernanceError> {
        if !matches!(self.stage, ProposalStage::Audited | ProposalStage::Approved) {
            return Err(GovernanceError::policy_violation(format!(
                "approvals are collected after audit; proposal is {}",
                self.stage
            )));
        }
        self.manifest.approvals.push(approval);
        let satisfied = version::check_approvals(
            self.manifest.change_impact,
            &self.manifest.approvals,
            &self.manifest.change_reason_code,
        )
        .is_ok();
        if satisfied {
            self.stage = ProposalStage::Approved;
        }
        Ok(())
    }

    /// Signs the canonical manifest bytes (minus the signature field).
    ///
    /// # Errors
    ///
    /// Returns `POLICY_VIOLATION` when the proposal is not at `Approved`, or
    /// `SCHEMA_VIOLATION` when the manifest cannot be canonicalized. Signing
    /// failures (unknown or revoked key) surface as `POLICY_VIOLATION`.
    pub fn sign(
        &mut self,
        signer: &dyn SigningAuthority,
        key_id: &KeyId,
    ) -> Result<(), GovernanceError> {
        self.expect_stage(ProposalStage::Approved)?;
        let bytes = signable_manifest_bytes(&self.manifest)?;
        let signature = signer
            .sign(&bytes, key_id)
            .map_err(|err| GovernanceError::policy_violation(err.to_string()))?;
        self.manifest.signature = Some(signature);
        self.stage = ProposalStage::Signed;
        Ok(())
    }

    /// Rejects the proposal unless it sits at the expected stage.
    fn expect_stage(&self, expected: ProposalStage) -> Result<(), GovernanceError> {
        if self.stage != expected {
            return Err(GovernanceError::policy_violation(format!(
                "proposal is {} but the operation requires {expected}",
                self.stage
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Signable Bytes
// ============================================================================

/// Returns the canonical manifest bytes minus the `signature` field.
///
/// Floats are rejected outright; manifests never carry them.
///
/// # Errors
///
/// Returns `SCHEMA_VIOLATION` when the manifest cannot be canonicalized.
pub fn signable_manifest_bytes(manifest: &Manifest) -> Result<Vec<u8>, GovernanceError> {
    let mut unsigned = manifest.clone();
    unsigned.signature = None;
    hashing::canonical_bytes_no_floats(&unsigned)
        .map_err(|err| GovernanceError::schema_violation(err.to_string()))
}
