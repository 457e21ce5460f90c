// crates/governance-core/src/core/version.rs
// ============================================================================
// Module: Semantic Versioner
// Description: Impact-driven semantic version computation and approval rules.
// Purpose: Enforce the impact-to-bump contract on every publish.
// Dependencies: semver, serde
// ============================================================================

//! ## Overview
//! The versioner computes the next semantic version from the prior published
//! version and the declared change impact, and rejects proposals whose
//! declared version disagrees with the computed one. Each impact level also
//! carries an approval requirement: major bumps need a `governance` approval
//! (the manifest's change reason code serves as the change-control
//! reference), minor bumps need two distinct approvals, and patch bumps need
//! `maintainer` plus `qa`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use semver::Version;
use serde::Deserialize;
use serde::Serialize;

use crate::core::artifact::Approval;
use crate::core::error::GovernanceError;

// ============================================================================
// SECTION: Change Impact
// ============================================================================

/// Declared change impact for a proposal.
///
/// # Invariants
/// - Wire form is the lowercase impact label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeImpact {
    /// Breaking change; bumps the major component.
    Major,
    /// Backward-compatible feature; bumps the minor component.
    Minor,
    /// Fix with no semantic surface change; bumps the patch component.
    Patch,
}

impl ChangeImpact {
    /// Returns the stable label for the impact.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for ChangeImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Version Computation
// ============================================================================

/// Computes the next version from the prior version and declared impact.
///
/// With no prior version the first publish is always `1.0.0` regardless of
/// declared impact.
#[must_use]
pub fn compute_next(prior: Option<&Version>, impact: ChangeImpact) -> Version {
    let Some(prior) = prior else {
        return Version::new(1, 0, 0);
    };
    match impact {
        ChangeImpact::Major => Version::new(prior.major + 1, 0, 0),
        ChangeImpact::Minor => Version::new(prior.major, prior.minor + 1, 0),
        ChangeImpact::Patch => Version::new(prior.major, prior.minor, prior.patch + 1),
    }
}

/// Checks that a declared version equals the computed next version.
///
/// # Errors
///
/// Returns a `POLICY_VIOLATION` [`GovernanceError`] on mismatch.
pub fn check_declared(
    declared: &Version,
    prior: Option<&Version>,
    impact: ChangeImpact,
) -> Result<(), GovernanceError> {
    let computed = compute_next(prior, impact);
    if *declared != computed {
        return Err(GovernanceError::policy_violation(format!(
            "declared version {declared} disagrees with computed {computed} for {impact} impact"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Approval Requirements
// ============================================================================

/// Role label required for major bumps.
pub const ROLE_GOVERNANCE: &str = "governance";
/// Role label required (with QA) for patch bumps.
pub const ROLE_MAINTAINER: &str = "maintainer";
/// Role label required (with maintainer) for patch bumps.
pub const ROLE_QA: &str = "qa";

/// Checks the approval set against the impact's requirement.
///
/// # Errors
///
/// Returns a `POLICY_VIOLATION` [`GovernanceError`] naming the missing
/// approvals.
pub fn check_approvals(
    impact: ChangeImpact,
    approvals: &[Approval],
    change_reason_code: &str,
) -> Result<(), GovernanceError> {
    match impact {
        ChangeImpact::Major => {
            if change_reason_code.trim().is_empty() {
                return Err(GovernanceError::policy_violation(
                    "major bump requires an explicit change-control reference",
                ));
            }
            if !has_role(approvals, ROLE_GOVERNANCE) {
                return Err(GovernanceError::policy_violation(
                    "major bump requires a governance approval",
                ));
            }
        }
        ChangeImpact::Minor => {
            let distinct: BTreeSet<(&str, &str)> = approvals
                .iter()
                .map(|approval| (approval.role.as_str(), approval.actor.as_str()))
                .collect();
            if distinct.len() < 2 {
                return Err(GovernanceError::policy_violation(
                    "minor bump requires two distinct approvals",
                ));
            }
        }
        ChangeImpact::Patch => {
            if !has_role(approvals, ROLE_MAINTAINER) || !has_role(approvals, ROLE_QA) {
                return Err(GovernanceError::policy_violation(
                    "patch bump requires maintainer and qa approvals",
                ));
            }
        }
    }
    Ok(())
}

/// Returns whether any approval carries the given role.
fn has_role(approvals: &[Approval], role: &str) -> bool {
    approvals.iter().any(|approval| approval.role.as_str() == role)
}
