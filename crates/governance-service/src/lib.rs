// crates/governance-service/src/lib.rs
// ============================================================================
// Module: Governance Service Library
// Description: HTTP/JSON surface over the registry and job service.
// Purpose: Wire configuration into stores, registry, jobs, and the router.
// Dependencies: axum, governance-config, governance-core, governance-jobs,
//               governance-store-fs, tokio
// ============================================================================

//! ## Overview
//! The service crate assembles a running registry from validated
//! configuration: durable or in-memory stores, the signing key ring, the
//! governance registry facade, the job service with its worker pool, the
//! background sweeper, and the axum router implementing the wire protocol.
//! All mutations require the audit headers `X-Actor`, `X-Roles`, `X-Tenant`,
//! and `X-Reason`; taxonomy errors map to stable status codes at this
//! boundary and nowhere else.
//!
//! Security posture: every request is untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod server;
pub mod sweeper;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::AppState;
pub use server::ServiceError;
pub use server::build_router;
pub use server::build_state;
pub use server::serve;
pub use telemetry::StderrTelemetry;
