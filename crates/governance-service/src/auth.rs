// crates/governance-service/src/auth.rs
// ============================================================================
// Module: Audit Header Authentication
// Description: Extraction and validation of the mandatory audit headers.
// Purpose: Attribute every mutation to an actor, tenant, roles, and reason.
// Dependencies: axum, governance-core
// ============================================================================

//! ## Overview
//! Every mutation must carry `X-Actor`, `X-Roles` (comma-separated),
//! `X-Tenant`, and `X-Reason`. A missing or empty header is `AUTH_FAILED`
//! and maps to 401; a role requirement that the caller does not hold maps to
//! 403. Header values are untrusted and validated before use; the tenant
//! header must parse as a path-safe tenant identifier because it selects a
//! journal file on disk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use governance_core::ActorId;
use governance_core::GovernanceError;
use governance_core::RoleName;
use governance_core::TenantId;

// ============================================================================
// SECTION: Header Names
// ============================================================================

/// Acting identity header.
pub const HEADER_ACTOR: &str = "x-actor";
/// Comma-separated role list header.
pub const HEADER_ROLES: &str = "x-roles";
/// Tenant scope header.
pub const HEADER_TENANT: &str = "x-tenant";
/// Human-readable mutation reason header.
pub const HEADER_REASON: &str = "x-reason";

// ============================================================================
// SECTION: Audit Identity
// ============================================================================

/// Authenticated audit identity extracted from request headers.
///
/// # Invariants
/// - All fields are non-empty; `tenant` passed tenant validation.
#[derive(Debug, Clone)]
pub struct AuditIdentity {
    /// Acting identity.
    pub actor: ActorId,
    /// Roles the caller asserts.
    pub roles: Vec<RoleName>,
    /// Tenant scope of the mutation.
    pub tenant: TenantId,
    /// Mutation reason for the audit trail.
    pub reason: String,
}

impl AuditIdentity {
    /// Extracts and validates the audit identity from request headers.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_FAILED` when any header is missing, empty, or invalid.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, GovernanceError> {
        let actor = required_header(headers, HEADER_ACTOR)?;
        let roles_raw = required_header(headers, HEADER_ROLES)?;
        let tenant_raw = required_header(headers, HEADER_TENANT)?;
        let reason = required_header(headers, HEADER_REASON)?;
        let roles: Vec<RoleName> = roles_raw
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(RoleName::new)
            .collect();
        if roles.is_empty() {
            return Err(GovernanceError::auth_failed("X-Roles must name at least one role"));
        }
        let tenant = TenantId::new(tenant_raw)
            .map_err(|err| GovernanceError::auth_failed(format!("X-Tenant invalid: {err}")))?;
        Ok(Self {
            actor: ActorId::new(actor),
            roles,
            tenant,
            reason,
        })
    }

    /// Returns whether the caller asserts the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held.as_str() == role)
    }

    /// Requires one of the listed roles.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_FAILED` naming the missing roles; the HTTP boundary maps
    /// held-headers-but-missing-role to 403.
    pub fn require_any_role(&self, roles: &[&str]) -> Result<(), GovernanceError> {
        if roles.iter().any(|role| self.has_role(role)) {
            return Ok(());
        }
        Err(GovernanceError::auth_failed(format!(
            "one of roles [{}] is required",
            roles.join(", ")
        )))
    }
}

/// Reads a required, non-empty header value.
fn required_header(headers: &HeaderMap, name: &str) -> Result<String, GovernanceError> {
    let value = headers
        .get(name)
        .ok_or_else(|| GovernanceError::auth_failed(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| GovernanceError::auth_failed(format!("{name} header is not UTF-8")))?
        .trim();
    if value.is_empty() {
        return Err(GovernanceError::auth_failed(format!("{name} header is empty")));
    }
    Ok(value.to_string())
}
