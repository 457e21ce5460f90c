// crates/governance-core/src/core/error.rs
// ============================================================================
// Module: Governance Error Taxonomy
// Description: Typed failure codes shared across every registry surface.
// Purpose: Carry code, message, and remediation so callers can act programmatically.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every user-visible registry failure carries a stable taxonomy code, a
//! human-readable message, and a remediation hint. Handlers never swallow
//! errors; the publish transaction fails closed, and the HTTP boundary maps
//! codes to status codes. Retry policy is keyed off the code: only
//! `RATE_LIMITED` and `TIMEOUT` are retryable by callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable governance failure codes.
///
/// # Invariants
/// - Wire form is the SCREAMING_SNAKE_CASE code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed input, canonicalization failure, or hash mismatch at ingest.
    SchemaViolation,
    /// Version key collision or upstream pin no longer publishable.
    StaleSnapshot,
    /// Version mismatch, missing approvals, or invalid waiver.
    PolicyViolation,
    /// License tag forbids the requested operation.
    LicensingBlock,
    /// Referenced upstream artifact is missing or withdrawn.
    SourceUnavailable,
    /// Recomputed hash differs from the stored hash, or an event chain broke.
    NondeterministicOutput,
    /// Quota refusal; retry after the suggested delay.
    RateLimited,
    /// Missing or invalid audit headers, or insufficient roles.
    AuthFailed,
    /// Handler exceeded its deadline.
    Timeout,
}

impl ErrorCode {
    /// Returns the stable wire label for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaViolation => "SCHEMA_VIOLATION",
            Self::StaleSnapshot => "STALE_SNAPSHOT",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::LicensingBlock => "LICENSING_BLOCK",
            Self::SourceUnavailable => "SOURCE_UNAVAILABLE",
            Self::NondeterministicOutput => "NONDETERMINISTIC_OUTPUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Returns the default remediation hint for the code.
    #[must_use]
    pub const fn remediation(self) -> &'static str {
        match self {
            Self::SchemaViolation => {
                "Fix the payload or manifest so it validates against the class schema; do not retry unchanged."
            }
            Self::StaleSnapshot => {
                "Refresh to the latest published version and resubmit with recomputed upstream pins."
            }
            Self::PolicyViolation => {
                "Collect the required approvals or correct the declared version, then resubmit."
            }
            Self::LicensingBlock => {
                "Choose a license tag permitted by the active policy pack or request a waiver."
            }
            Self::SourceUnavailable => {
                "Re-pin the proposal to an upstream artifact that is currently publishable."
            }
            Self::NondeterministicOutput => {
                "Treat stored data as suspect; restore from backup and verify the event chain."
            }
            Self::RateLimited => "Retry after the suggested delay or request a quota increase.",
            Self::AuthFailed => {
                "Supply X-Actor, X-Roles, X-Tenant, and X-Reason headers with sufficient roles."
            }
            Self::Timeout => "Retry the job if retry budget remains, or raise the handler deadline.",
        }
    }

    /// Returns whether a caller may retry the failed operation unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Governance Error
// ============================================================================

/// Typed governance failure with taxonomy code and remediation hint.
///
/// # Invariants
/// - `remediation` is never empty; it defaults from the code.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct GovernanceError {
    /// Stable taxonomy code.
    pub code: ErrorCode,
    /// Human-readable failure description.
    pub message: String,
    /// Remediation hint for the caller.
    pub remediation: String,
}

impl GovernanceError {
    /// Creates an error with the default remediation for the code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            remediation: code.remediation().to_string(),
        }
    }

    /// Creates a `SCHEMA_VIOLATION` error.
    #[must_use]
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaViolation, message)
    }

    /// Creates a `STALE_SNAPSHOT` error.
    #[must_use]
    pub fn stale_snapshot(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StaleSnapshot, message)
    }

    /// Creates a `POLICY_VIOLATION` error.
    #[must_use]
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyViolation, message)
    }

    /// Creates a `LICENSING_BLOCK` error.
    #[must_use]
    pub fn licensing_block(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LicensingBlock, message)
    }

    /// Creates a `SOURCE_UNAVAILABLE` error.
    #[must_use]
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceUnavailable, message)
    }

    /// Creates a `NONDETERMINISTIC_OUTPUT` error.
    #[must_use]
    pub fn nondeterministic(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NondeterministicOutput, message)
    }

    /// Creates a `RATE_LIMITED` error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, message)
    }

    /// Creates an `AUTH_FAILED` error.
    #[must_use]
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthFailed, message)
    }

    /// Creates a `TIMEOUT` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }
}
