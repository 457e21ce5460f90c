// crates/governance-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Shared builders for registries, manifests, and proposals.
// Purpose: Keep integration tests focused on the behavior under test.
// ============================================================================

//! ## Overview
//! Helpers that assemble an in-memory registry with a manual clock, a test
//! signing key, and convenience constructors for manifests and proposals.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only helpers; not every test uses every helper."
)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use governance_core::Approval;
use governance_core::ArtifactClass;
use governance_core::ArtifactId;
use governance_core::ChangeImpact;
use governance_core::Clock;
use governance_core::Ed25519Signer;
use governance_core::EnvironmentFingerprint;
use governance_core::EventChainMac;
use governance_core::GovernanceRegistry;
use governance_core::HashAlgorithm;
use governance_core::HashDigest;
use governance_core::InMemoryArtifactStore;
use governance_core::InMemoryEventLog;
use governance_core::KeyId;
use governance_core::Manifest;
use governance_core::ManualClock;
use governance_core::Proposal;
use governance_core::RegistryPolicy;
use governance_core::RegistryServices;
use governance_core::Slug;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::UpstreamPin;
use governance_core::interfaces::ArtifactStore;
use governance_core::interfaces::EventLog;
use semver::Version;
use serde_json::Value;
use serde_json::json;

/// Test event secret.
pub const EVENT_SECRET: &[u8] = b"test-event-secret";
/// Test signing key identifier.
pub const SIGNING_KEY: &str = "k-test";
/// Test epoch start (2026-01-01T00:00:00Z in unix milliseconds).
pub const EPOCH: i64 = 1_767_225_600_000;

/// Handles into a freshly built in-memory registry.
pub struct Harness {
    /// Registry under test.
    pub registry: GovernanceRegistry,
    /// Artifact store handle for direct assertions.
    pub store: Arc<InMemoryArtifactStore>,
    /// Event log handle for direct assertions.
    pub events: Arc<InMemoryEventLog>,
    /// Manual clock.
    pub clock: Arc<ManualClock>,
}

/// Builds the chain MAC used across event log tests.
pub fn mac() -> EventChainMac {
    EventChainMac::new(EVENT_SECRET).expect("chain mac")
}

/// Builds a signer holding the test key.
pub fn signer() -> Ed25519Signer {
    let mut signer = Ed25519Signer::new();
    let seed = BASE64.encode([7u8; 32]);
    signer.add_signing_key(KeyId::new(SIGNING_KEY), &seed).expect("signing key");
    signer
}

/// Builds a registry harness over in-memory stores.
pub fn harness() -> Harness {
    let store = Arc::new(InMemoryArtifactStore::new());
    let events = Arc::new(InMemoryEventLog::new(mac()));
    let clock = Arc::new(ManualClock::starting_at(Timestamp::from_unix_millis(EPOCH)));
    let services = RegistryServices {
        store: Arc::clone(&store) as Arc<dyn ArtifactStore>,
        events: Arc::clone(&events) as Arc<dyn EventLog>,
        clock: Arc::clone(&clock) as Arc<dyn Clock>,
        telemetry: Arc::new(governance_core::NoopTelemetry),
    };
    let registry = GovernanceRegistry::new(services, signer(), RegistryPolicy::default())
        .expect("registry");
    Harness {
        registry,
        store,
        events,
        clock,
    }
}

/// Returns a placeholder digest overwritten by `Proposal::propose`.
pub fn placeholder_hash() -> HashDigest {
    HashDigest {
        algorithm: HashAlgorithm::Sha256,
        value: String::new(),
    }
}

/// Builds a manifest draft for the given coordinates.
pub fn manifest_draft(
    class: ArtifactClass,
    tenant: &str,
    slug: &str,
    version: &str,
    impact: ChangeImpact,
    upstream: Vec<UpstreamPin>,
) -> Manifest {
    Manifest {
        artifact_id: ArtifactId::generate(),
        class,
        tenant: TenantId::new(tenant).expect("tenant"),
        slug: Slug::new(slug).expect("slug"),
        version: Version::parse(version).expect("version"),
        hash: placeholder_hash(),
        title: format!("{slug} artifact"),
        summary: "test artifact".to_string(),
        license_tag: "cc-by-4.0".to_string(),
        policy_pack_hash: HashDigest::new(HashAlgorithm::Sha256, b"policy-pack"),
        creator: "producer@acme".into(),
        created_at: Timestamp::from_unix_millis(EPOCH),
        change_reason_code: "CC-100".to_string(),
        change_impact: impact,
        upstream,
        approvals: Vec::new(),
        waivers: Vec::new(),
        environment_fingerprint: EnvironmentFingerprint::default(),
        prompt_refs: Vec::new(),
        supersedes: None,
        signature: None,
    }
}

/// Builds an approval for the given role.
pub fn approval(role: &str, actor: &str) -> Approval {
    Approval {
        role: role.into(),
        actor: actor.into(),
        ts: Timestamp::from_unix_millis(EPOCH),
        signature: "c2lnbmVk".to_string(),
    }
}

/// Canonical coverage plan payload used across publish tests.
pub fn coverage_payload() -> Value {
    json!({
        "strata": [
            {"concept_id": "c-legal-1", "quota": 25},
            {"concept_id": "c-legal-2", "quota": 75},
        ],
    })
}

/// Canonical KOS snapshot payload used across publish tests.
pub fn kos_payload() -> Value {
    json!({
        "scheme": "eurovoc",
        "concept_count": 7322,
    })
}

/// Drives a proposal through build, audit, approval, and signing.
pub fn ready_proposal(registry: &GovernanceRegistry, manifest: Manifest, payload: Value) -> Proposal {
    let mut proposal =
        Proposal::propose(registry.schemas(), manifest, payload).expect("propose");
    proposal.attach_build(EnvironmentFingerprint::default()).expect("build");
    proposal.record_audit(true).expect("audit");
    apply_required_approvals(&mut proposal);
    proposal.sign(registry.signer(), &KeyId::new(SIGNING_KEY)).expect("sign");
    proposal
}

/// Adds the approvals required by the proposal's change impact.
pub fn apply_required_approvals(proposal: &mut Proposal) {
    match proposal.manifest.change_impact {
        ChangeImpact::Major => {
            proposal.approve(approval("governance", "gov@acme")).expect("approve");
        }
        ChangeImpact::Minor => {
            proposal.approve(approval("maintainer", "dev@acme")).expect("approve");
            proposal.approve(approval("qa", "qa@acme")).expect("approve");
        }
        ChangeImpact::Patch => {
            proposal.approve(approval("maintainer", "dev@acme")).expect("approve");
            proposal.approve(approval("qa", "qa@acme")).expect("approve");
        }
    }
}

/// Publishes a root KOS snapshot and returns its committed manifest.
pub fn publish_kos(harness: &Harness, tenant: &str, slug: &str) -> Manifest {
    let draft = manifest_draft(
        ArtifactClass::KosSnapshot,
        tenant,
        slug,
        "1.0.0",
        ChangeImpact::Patch,
        Vec::new(),
    );
    let proposal = ready_proposal(&harness.registry, draft, kos_payload());
    harness.registry.publish(proposal).expect("publish kos")
}

/// Returns an upstream pin for a committed manifest.
pub fn pin(manifest: &Manifest) -> UpstreamPin {
    UpstreamPin {
        artifact_id: manifest.artifact_id,
        hash: manifest.hash.clone(),
    }
}
