// crates/governance-core/src/lib.rs
// ============================================================================
// Module: Governance Core Library
// Description: Data model, canonical hashing, signing, and publish runtime.
// Purpose: Provide the governance registry core shared by all service crates.
// Dependencies: serde, serde_jcs, sha2, ed25519-dalek, hmac, semver, uuid
// ============================================================================

//! ## Overview
//! Governance Core defines the artifact, event, waiver, and job data model of
//! the DomainDetermine governance registry, together with the deterministic
//! canonicalizer, the signing authorities, the lineage graph, the release
//! gate, and the publish pipeline that enforces every registry invariant.
//! Invariants:
//! - Manifests are immutable once committed; corrections supersede.
//! - Payload hashes are re-verified on every read path and fail closed.
//! - Event journals are HMAC-chained with strictly monotonic sequences.
//!
//! Security posture: all inputs are untrusted and must be validated; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod memory;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::artifact::Approval;
pub use crate::core::artifact::ArtifactClass;
pub use crate::core::artifact::ArtifactKey;
pub use crate::core::artifact::ArtifactStatus;
pub use crate::core::artifact::EnvironmentFingerprint;
pub use crate::core::artifact::Manifest;
pub use crate::core::artifact::PromptRef;
pub use crate::core::artifact::UpstreamPin;
pub use crate::core::error::ErrorCode;
pub use crate::core::error::GovernanceError;
pub use crate::core::event::EventDraft;
pub use crate::core::event::EventKind;
pub use crate::core::event::EventRecord;
pub use crate::core::event::GENESIS_PREV_HMAC;
pub use crate::core::hashing;
pub use crate::core::hashing::HashAlgorithm;
pub use crate::core::hashing::HashDigest;
pub use crate::core::identifiers::ActorId;
pub use crate::core::identifiers::ArtifactId;
pub use crate::core::identifiers::JobId;
pub use crate::core::identifiers::KeyId;
pub use crate::core::identifiers::RoleName;
pub use crate::core::identifiers::Slug;
pub use crate::core::identifiers::TenantId;
pub use crate::core::identifiers::TraceId;
pub use crate::core::identifiers::WaiverId;
pub use crate::core::job::JobRecord;
pub use crate::core::job::JobRequest;
pub use crate::core::job::JobStatus;
pub use crate::core::job::QuotaDimension;
pub use crate::core::job::QuotaLimits;
pub use crate::core::job::QuotaRefusal;
pub use crate::core::lineage::LineageGraph;
pub use crate::core::release::GateDecision;
pub use crate::core::release::GateOutcome;
pub use crate::core::release::GatePolicy;
pub use crate::core::schema::SchemaRegistry;
pub use crate::core::signing::Ed25519Signer;
pub use crate::core::signing::EventChainMac;
pub use crate::core::signing::Signature;
pub use crate::core::signing::SignatureAlgorithm;
pub use crate::core::signing::SigningAuthority;
pub use crate::core::telemetry::MetricKind;
pub use crate::core::telemetry::MetricSample;
pub use crate::core::telemetry::NoopTelemetry;
pub use crate::core::telemetry::OpRecord;
pub use crate::core::telemetry::OpStatus;
pub use crate::core::telemetry::Telemetry;
pub use crate::core::time::Clock;
pub use crate::core::time::ManualClock;
pub use crate::core::time::SystemClock;
pub use crate::core::time::Timestamp;
pub use crate::core::version::ChangeImpact;
pub use crate::core::waiver::Waiver;
pub use crate::core::waiver::WaiverManager;
pub use crate::core::waiver::WaiverScope;
pub use crate::core::waiver::WaiverStatus;
pub use crate::interfaces::ArtifactStore;
pub use crate::interfaces::EventLog;
pub use crate::interfaces::JobLog;
pub use crate::interfaces::RegistryServices;
pub use crate::memory::InMemoryArtifactStore;
pub use crate::memory::InMemoryEventLog;
pub use crate::memory::InMemoryJobLog;
pub use crate::runtime::publish::Proposal;
pub use crate::runtime::publish::ProposalStage;
pub use crate::runtime::registry::GovernanceRegistry;
pub use crate::runtime::registry::RegistryPolicy;
