// crates/governance-core/src/core/artifact.rs
// ============================================================================
// Module: Artifact Model
// Description: Artifact classes, manifests, pins, approvals, and statuses.
// Purpose: Capture the immutable metadata record for every registry artifact.
// Dependencies: crate::core::{hashing, identifiers, signing, time}, semver, serde
// ============================================================================

//! ## Overview
//! A manifest is the metadata record describing an artifact: identity,
//! semantic version, content hash, upstream pins, approvals, waiver
//! references, environment fingerprint, and detached signature. Manifests are
//! immutable once committed; corrections create a new version carrying a
//! `supersedes` link, and terminal status transitions live on a side table so
//! committed bytes never change.
//!
//! Security posture: manifests are untrusted on load; hashes and signatures
//! must be re-verified. See `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ActorId;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::Slug;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::WaiverId;
use crate::core::signing::Signature;
use crate::core::time::Timestamp;
use crate::core::version::ChangeImpact;

// ============================================================================
// SECTION: Artifact Classes
// ============================================================================

/// Artifact classes accepted by the registry.
///
/// # Invariants
/// - Wire form is the lowercase snake_case class label.
/// - Root classes may publish with an empty upstream pin set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    /// Knowledge-organization-system snapshot.
    KosSnapshot,
    /// Coverage plan allocation.
    CoveragePlan,
    /// Concept mapping artifact.
    Mapping,
    /// Overlay artifact refining a snapshot.
    Overlay,
    /// Audit certificate for a reviewed artifact.
    AuditCertificate,
    /// Evaluation suite derived from a coverage plan.
    EvalSuite,
    /// Prompt pack consumed by pipeline modules.
    PromptPack,
    /// Run bundle capturing a pipeline execution.
    RunBundle,
    /// Release manifest gating a deployment.
    ReleaseManifest,
}

impl ArtifactClass {
    /// All artifact classes in stable order.
    pub const ALL: [Self; 9] = [
        Self::KosSnapshot,
        Self::CoveragePlan,
        Self::Mapping,
        Self::Overlay,
        Self::AuditCertificate,
        Self::EvalSuite,
        Self::PromptPack,
        Self::RunBundle,
        Self::ReleaseManifest,
    ];

    /// Returns the stable label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KosSnapshot => "kos_snapshot",
            Self::CoveragePlan => "coverage_plan",
            Self::Mapping => "mapping",
            Self::Overlay => "overlay",
            Self::AuditCertificate => "audit_certificate",
            Self::EvalSuite => "eval_suite",
            Self::PromptPack => "prompt_pack",
            Self::RunBundle => "run_bundle",
            Self::ReleaseManifest => "release_manifest",
        }
    }

    /// Returns whether the class may publish with no upstream pins.
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::KosSnapshot | Self::PromptPack)
    }
}

impl fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Artifact Key
// ============================================================================

/// Unique `(class, tenant, slug, version)` coordinate of an artifact.
///
/// # Invariants
/// - Renders as `<class>/<tenant>/<slug>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Artifact class.
    pub class: ArtifactClass,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Artifact slug.
    pub slug: Slug,
    /// Semantic version.
    pub version: Version,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.class, self.tenant, self.slug, self.version)
    }
}

// ============================================================================
// SECTION: Manifest Components
// ============================================================================

/// Pin of a specific upstream artifact revision.
///
/// # Invariants
/// - `hash` matches the pinned artifact's content hash at pin time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamPin {
    /// Pinned artifact identifier.
    pub artifact_id: ArtifactId,
    /// Content hash at pin time.
    pub hash: HashDigest,
}

/// Signed approval attached to a manifest.
///
/// # Invariants
/// - `signature` covers the approval payload under the approver's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Approving role.
    pub role: RoleName,
    /// Approving actor.
    pub actor: ActorId,
    /// Approval timestamp.
    pub ts: Timestamp,
    /// Detached approval signature (base64).
    pub signature: String,
}

/// Reproducibility fingerprint of the build environment.
///
/// # Invariants
/// - Keys of `build_tool_versions` are tool names; values are version labels.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    /// Implementation-language toolchain version.
    pub language_version: String,
    /// Container image digest the producer ran in.
    pub container_digest: String,
    /// Build tool versions by tool name.
    pub build_tool_versions: std::collections::BTreeMap<String, String>,
}

/// Reference to a prompt template revision (`template_id:version#hash`).
///
/// # Invariants
/// - `hash` is the canonical hash of the referenced template payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRef {
    /// Prompt template identifier.
    pub template_id: String,
    /// Prompt template version.
    pub version: Version,
    /// Canonical content hash of the template.
    pub hash: HashDigest,
}

impl fmt::Display for PromptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.template_id, self.version, self.hash.value)
    }
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Immutable metadata record describing a published artifact.
///
/// # Invariants
/// - `hash` equals the canonical hash of the stored payload.
/// - `upstream` is empty only for root classes.
/// - `signature` covers the canonical manifest bytes minus the signature
///   field itself, and is present on every committed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Globally unique artifact identifier.
    pub artifact_id: ArtifactId,
    /// Artifact class.
    pub class: ArtifactClass,
    /// Tenant identifier.
    pub tenant: TenantId,
    /// Artifact slug.
    pub slug: Slug,
    /// Semantic version.
    pub version: Version,
    /// Canonical content hash of the payload.
    pub hash: HashDigest,
    /// Human-readable title.
    pub title: String,
    /// Human-readable summary.
    pub summary: String,
    /// License tag applied by the producer.
    pub license_tag: String,
    /// Canonical hash of the policy pack in force at publish.
    pub policy_pack_hash: HashDigest,
    /// Creating actor.
    pub creator: ActorId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Stable change reason code (change-control reference).
    pub change_reason_code: String,
    /// Declared change impact driving the version bump.
    pub change_impact: ChangeImpact,
    /// Ordered upstream pins.
    pub upstream: Vec<UpstreamPin>,
    /// Collected approvals.
    pub approvals: Vec<Approval>,
    /// Referenced waiver identifiers.
    pub waivers: Vec<WaiverId>,
    /// Build environment fingerprint.
    pub environment_fingerprint: EnvironmentFingerprint,
    /// Optional prompt template references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompt_refs: Vec<PromptRef>,
    /// Superseded artifact, when this version corrects a prior one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ArtifactId>,
    /// Detached manifest signature (absent only while in flight).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Manifest {
    /// Returns the `(class, tenant, slug, version)` key of this manifest.
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey {
            class: self.class,
            tenant: self.tenant.clone(),
            slug: self.slug.clone(),
            version: self.version.clone(),
        }
    }
}

// ============================================================================
// SECTION: Artifact Status
// ============================================================================

/// Lifecycle status recorded on the side table.
///
/// # Invariants
/// - Wire form is the SCREAMING_SNAKE_CASE status label.
/// - `Revoked` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    /// Artifact is published and consumable.
    Published,
    /// Artifact was revoked and must not be pinned.
    Revoked,
    /// Artifact was rolled back and must not be pinned.
    RolledBack,
}

impl ArtifactStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::Revoked => "REVOKED",
            Self::RolledBack => "ROLLED_BACK",
        }
    }

    /// Returns whether artifacts in this status may be pinned by downstreams.
    #[must_use]
    pub const fn is_publishable(self) -> bool {
        matches!(self, Self::Published)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PUBLISHED" => Ok(Self::Published),
            "REVOKED" => Ok(Self::Revoked),
            "ROLLED_BACK" => Ok(Self::RolledBack),
            other => Err(format!("unknown artifact status: {other}")),
        }
    }
}
