// crates/governance-core/src/core/waiver.rs
// ============================================================================
// Module: Waiver Lifecycle
// Description: Time-bounded governance exceptions and their state machine.
// Purpose: Enforce waiver validity at publish and sweep expirations.
// Dependencies: crate::core::{artifact, error, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A waiver is a time-bounded, owner-attributed exception from a governance
//! gate. Waivers move `PROPOSED -> APPROVED -> {EXPIRED | REVOKED}`; only a
//! `governance` approver may approve. A waiver is valid exactly when it is
//! `APPROVED` and `now < expires_at`; expiry at the boundary instant counts
//! as expired. The manager owns no durable state: every transition is emitted
//! as a governance event and the table is rebuilt from the journal on
//! startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::core::artifact::ArtifactClass;
use crate::core::error::GovernanceError;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::WaiverId;
use crate::core::time::Timestamp;
use crate::core::version::ROLE_GOVERNANCE;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Advisory window before expiry, in milliseconds (seven days).
const EXPIRY_ADVISORY_WINDOW_MS: i64 = 7 * 86_400_000;

// ============================================================================
// SECTION: Waiver Model
// ============================================================================

/// Scope a waiver applies to.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaiverScope {
    /// Waiver covers every artifact of a class.
    Class {
        /// Covered artifact class.
        class: ArtifactClass,
    },
    /// Waiver covers one specific artifact.
    Artifact {
        /// Covered artifact identifier.
        artifact_id: ArtifactId,
    },
}

/// Waiver lifecycle status.
///
/// # Invariants
/// - Wire form is the SCREAMING_SNAKE_CASE status label.
/// - `Expired` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaiverStatus {
    /// Proposed, awaiting governance approval.
    Proposed,
    /// Approved and usable until expiry.
    Approved,
    /// Expired by the sweeper.
    Expired,
    /// Revoked before expiry.
    Revoked,
}

impl WaiverStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "PROPOSED",
            Self::Approved => "APPROVED",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for WaiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-bounded governance exception.
///
/// # Invariants
/// - `expires_at` is strictly after `created_at` at proposal time.
/// - `tenant` scopes the waiver's events to one journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiver {
    /// Waiver identifier.
    pub waiver_id: WaiverId,
    /// Tenant whose journal records this waiver's transitions.
    pub tenant: TenantId,
    /// Scope of the exception.
    pub scope: WaiverScope,
    /// Owning actor.
    pub owner: ActorId,
    /// Why the exception is needed.
    pub justification: String,
    /// Mitigation in place while the exception holds.
    pub mitigation: String,
    /// Proposal timestamp.
    pub created_at: Timestamp,
    /// Expiry timestamp (exclusive).
    pub expires_at: Timestamp,
    /// Current lifecycle status.
    pub status: WaiverStatus,
    /// Advisory references (tickets, risk register entries).
    pub advisory_refs: Vec<String>,
}

impl Waiver {
    /// Returns whether the waiver is valid at the given instant.
    ///
    /// Valid means `APPROVED` and strictly before expiry.
    #[must_use]
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.status == WaiverStatus::Approved && now < self.expires_at
    }
}

// ============================================================================
// SECTION: Sweep Transitions
// ============================================================================

/// Transition emitted by a sweeper pass.
///
/// # Invariants
/// - `Expired` transitions have already been applied to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaiverTransition {
    /// Waiver crossed its expiry boundary and is now `EXPIRED`.
    Expired(Waiver),
    /// Waiver enters its final seven days of validity (emitted once).
    ExpiringSoon(Waiver),
}

// ============================================================================
// SECTION: Waiver Manager
// ============================================================================

/// In-memory waiver table with the lifecycle state machine.
///
/// # Invariants
/// - Transitions are validated; illegal transitions fail with
///   `POLICY_VIOLATION`.
/// - The table is reconstructible from governance events.
#[derive(Debug, Default)]
pub struct WaiverManager {
    /// Waiver table keyed by identifier.
    table: Mutex<BTreeMap<WaiverId, Waiver>>,
    /// Waivers already flagged by the seven-day advisory.
    advised: Mutex<BTreeSet<WaiverId>>,
}

impl WaiverManager {
    /// Creates an empty waiver manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Proposes a new waiver.
    ///
    /// # Errors
    ///
    /// Returns a `POLICY_VIOLATION` [`GovernanceError`] when the identifier is
    /// already in use or the expiry is not after creation.
    pub fn propose(&self, waiver: Waiver) -> Result<Waiver, GovernanceError> {
        if waiver.status != WaiverStatus::Proposed {
            return Err(GovernanceError::policy_violation("new waivers must start as PROPOSED"));
        }
        if waiver.expires_at <= waiver.created_at {
            return Err(GovernanceError::policy_violation(
                "waiver expiry must be after creation",
            ));
        }
        let mut table = self.lock_table();
        if table.contains_key(&waiver.waiver_id) {
            return Err(GovernanceError::policy_violation(format!(
                "waiver {} already exists",
                waiver.waiver_id
            )));
        }
        table.insert(waiver.waiver_id.clone(), waiver.clone());
        Ok(waiver)
    }

    /// Approves a proposed waiver; the approver must hold `governance`.
    ///
    /// # Errors
    ///
    /// Returns a `POLICY_VIOLATION` [`GovernanceError`] when the approver role
    /// is wrong, the waiver is unknown, or it is not in `PROPOSED`.
    pub fn approve(
        &self,
        waiver_id: &WaiverId,
        approver_role: &RoleName,
    ) -> Result<Waiver, GovernanceError> {
        if approver_role.as_str() != ROLE_GOVERNANCE {
            return Err(GovernanceError::policy_violation(
                "waiver approval requires the governance role",
            ));
        }
        self.transition(waiver_id, WaiverStatus::Proposed, WaiverStatus::Approved)
    }

    /// Revokes a waiver before expiry.
    ///
    /// # Errors
    ///
    /// Returns a `POLICY_VIOLATION` [`GovernanceError`] when the waiver is
    /// unknown or already terminal.
    pub fn revoke(&self, waiver_id: &WaiverId) -> Result<Waiver, GovernanceError> {
        let mut table = self.lock_table();
        let waiver = table.get_mut(waiver_id).ok_or_else(|| {
            GovernanceError::policy_violation(format!("unknown waiver {waiver_id}"))
        })?;
        if matches!(waiver.status, WaiverStatus::Expired | WaiverStatus::Revoked) {
            return Err(GovernanceError::policy_violation(format!(
                "waiver {waiver_id} is already terminal"
            )));
        }
        waiver.status = WaiverStatus::Revoked;
        Ok(waiver.clone())
    }

    /// Returns a waiver by identifier.
    #[must_use]
    pub fn get(&self, waiver_id: &WaiverId) -> Option<Waiver> {
        self.lock_table().get(waiver_id).cloned()
    }

    /// Validates every referenced waiver for a publish at `now`.
    ///
    /// # Errors
    ///
    /// Returns a `POLICY_VIOLATION` [`GovernanceError`] naming the first
    /// waiver that is unknown, unapproved, or expired.
    pub fn validate_for_publish(
        &self,
        waiver_ids: &[WaiverId],
        now: Timestamp,
    ) -> Result<(), GovernanceError> {
        let table = self.lock_table();
        for waiver_id in waiver_ids {
            let waiver = table.get(waiver_id).ok_or_else(|| {
                GovernanceError::policy_violation(format!("unknown waiver {waiver_id}"))
            })?;
            if !waiver.is_valid_at(now) {
                return Err(GovernanceError::policy_violation(format!(
                    "waiver {waiver_id} is not valid: status {} expires_at {}",
                    waiver.status,
                    waiver.expires_at.as_unix_millis()
                )));
            }
        }
        Ok(())
    }

    /// Sweeps the table: expires due waivers and flags the seven-day window.
    ///
    /// Returns the transitions for the caller to emit as governance events.
    #[must_use]
    pub fn sweep(&self, now: Timestamp) -> Vec<WaiverTransition> {
        let mut transitions = Vec::new();
        let mut table = self.lock_table();
        let mut advised = self.lock_advised();
        for waiver in table.values_mut() {
            if waiver.status != WaiverStatus::Approved {
                continue;
            }
            if waiver.expires_at <= now {
                waiver.status = WaiverStatus::Expired;
                transitions.push(WaiverTransition::Expired(waiver.clone()));
                continue;
            }
            let advisory_at = waiver.expires_at.plus_millis(-EXPIRY_ADVISORY_WINDOW_MS);
            if now >= advisory_at && advised.insert(waiver.waiver_id.clone()) {
                transitions.push(WaiverTransition::ExpiringSoon(waiver.clone()));
            }
        }
        transitions
    }

    /// Restores a waiver snapshot while replaying the journal.
    ///
    /// Replay bypasses transition validation: the journal is the authority.
    pub fn restore(&self, waiver: Waiver) {
        self.lock_table().insert(waiver.waiver_id.clone(), waiver);
    }

    /// Applies a status transition with source-state validation.
    fn transition(
        &self,
        waiver_id: &WaiverId,
        from: WaiverStatus,
        to: WaiverStatus,
    ) -> Result<Waiver, GovernanceError> {
        let mut table = self.lock_table();
        let waiver = table.get_mut(waiver_id).ok_or_else(|| {
            GovernanceError::policy_violation(format!("unknown waiver {waiver_id}"))
        })?;
        if waiver.status != from {
            return Err(GovernanceError::policy_violation(format!(
                "waiver {waiver_id} is {} and cannot move to {to}",
                waiver.status
            )));
        }
        waiver.status = to;
        Ok(waiver.clone())
    }

    /// Locks the waiver table, recovering from poisoning.
    fn lock_table(&self) -> std::sync::MutexGuard<'_, BTreeMap<WaiverId, Waiver>> {
        self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Locks the advisory set, recovering from poisoning.
    fn lock_advised(&self) -> std::sync::MutexGuard<'_, BTreeSet<WaiverId>> {
        self.advised.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
