// crates/governance-jobs/src/lib.rs
// ============================================================================
// Module: Governance Jobs Library
// Description: Job orchestration under per-tenant quotas.
// Purpose: Queue, schedule, retry, and cancel registry jobs on worker threads.
// Dependencies: governance-core, rand, serde, thiserror
// ============================================================================

//! ## Overview
//! The job service accepts requests from pipeline modules, enforces quota
//! decisions before persisting anything, schedules handlers on a pool of
//! worker threads, and writes lifecycle events back into the registry's
//! journal. Invariants:
//! - At most one job per idempotency key is unfinished at any moment.
//! - Reserved slots per tenant never exceed `max_concurrent_jobs`.
//! - Jobs start in enqueue order within a tenant, up to the concurrency cap.
//! - Retries preserve the original idempotency key.
//!
//! Security posture: job payloads are untrusted; handlers run them behind
//! cooperative cancellation. See `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod handler;
pub mod queue;
pub mod quota;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use handler::CancellationToken;
pub use handler::HandlerError;
pub use handler::HandlerRegistry;
pub use handler::JobContext;
pub use handler::JobHandler;
pub use handler::JobOutcome;
pub use queue::JobBoard;
pub use quota::QuotaManager;
pub use service::EnqueueError;
pub use service::JobService;
pub use service::JobServiceConfig;
