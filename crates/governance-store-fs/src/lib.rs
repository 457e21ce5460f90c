// crates/governance-store-fs/src/lib.rs
// ============================================================================
// Module: Governance Filesystem Store Library
// Description: Durable filesystem backends for artifacts, events, and jobs.
// Purpose: Persist registry state under a single store root directory.
// Dependencies: governance-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Filesystem implementations of the governance storage interfaces:
//! - [`FsArtifactStore`]: content-addressed payload blobs under
//!   `store/payloads/<sha256>`, canonical manifests under
//!   `store/manifests/<artifact_id>.json`, a unique version index under
//!   `store/index/<class>/<tenant>/<slug>/<version>`, and a status side
//!   table.
//! - [`FsEventLog`]: append-only per-tenant journals under
//!   `events/<tenant>.log`, HMAC-chained and verified on read and replay.
//! - [`FsJobLog`]: per-tenant job transition logs under `jobs/<tenant>.log`
//!   with compaction to the latest state per job.
//!
//! Invariants:
//! - Writes go through a temp file plus rename in the target directory.
//! - Every read path re-verifies content hashes and chain links, failing
//!   closed on mismatch.
//!
//! Security posture: store contents are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod event_log;
pub mod job_log;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use event_log::FsEventLog;
pub use job_log::FsJobLog;
pub use store::FsArtifactStore;
pub use store::FsStoreError;
