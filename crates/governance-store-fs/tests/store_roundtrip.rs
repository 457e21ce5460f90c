// crates/governance-store-fs/tests/store_roundtrip.rs
// ============================================================================
// Module: Filesystem Store Tests
// Description: CAS round-trips, collisions, corruption, and job log replay.
// ============================================================================
//! ## Overview
//! Exercises the filesystem artifact store against the storage contract:
//! insert-then-read round-trips, version key collisions, fail-closed hash
//! verification on tampered blobs, status side rows, and job log replay
//! plus compaction.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use governance_core::ArtifactClass;
use governance_core::ArtifactId;
use governance_core::ArtifactStatus;
use governance_core::ChangeImpact;
use governance_core::EnvironmentFingerprint;
use governance_core::ErrorCode;
use governance_core::HashAlgorithm;
use governance_core::HashDigest;
use governance_core::JobId;
use governance_core::JobRecord;
use governance_core::JobStatus;
use governance_core::Manifest;
use governance_core::Slug;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::hashing;
use governance_core::interfaces::ArtifactStore;
use governance_core::interfaces::JobLog;
use governance_store_fs::FsArtifactStore;
use governance_store_fs::FsJobLog;
use semver::Version;
use serde_json::Value;
use serde_json::json;

fn manifest_for(payload: &Value, slug: &str, version: &str) -> Manifest {
    Manifest {
        artifact_id: ArtifactId::generate(),
        class: ArtifactClass::KosSnapshot,
        tenant: TenantId::new("acme").expect("tenant"),
        slug: Slug::new(slug).expect("slug"),
        version: Version::parse(version).expect("version"),
        hash: hashing::hash_canonical_json(HashAlgorithm::Sha256, payload).expect("hash"),
        title: "snapshot".to_string(),
        summary: "snapshot".to_string(),
        license_tag: "cc-by-4.0".to_string(),
        policy_pack_hash: HashDigest::new(HashAlgorithm::Sha256, b"policy"),
        creator: "producer@acme".into(),
        created_at: Timestamp::from_unix_millis(0),
        change_reason_code: "CC-1".to_string(),
        change_impact: ChangeImpact::Patch,
        upstream: Vec::new(),
        approvals: Vec::new(),
        waivers: Vec::new(),
        environment_fingerprint: EnvironmentFingerprint::default(),
        prompt_refs: Vec::new(),
        supersedes: None,
        signature: None,
    }
}

#[test]
fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    let payload = json!({"scheme": "eurovoc", "concept_count": 10});
    let manifest = manifest_for(&payload, "eurovoc", "1.0.0");

    store.put(&manifest, &payload).expect("put");

    let loaded = store.get_manifest(&manifest.artifact_id).expect("manifest");
    assert_eq!(loaded, manifest);
    let blob = store.get_payload(&manifest.hash).expect("payload");
    assert_eq!(blob, payload);
    assert_eq!(
        store.status(&manifest.artifact_id).expect("status"),
        ArtifactStatus::Published
    );
}

#[test]
fn version_key_collision_is_stale_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    let payload = json!({"scheme": "eurovoc", "concept_count": 10});
    let first = manifest_for(&payload, "eurovoc", "1.0.0");
    store.put(&first, &payload).expect("put");

    let second = manifest_for(&payload, "eurovoc", "1.0.0");
    let err = store.put(&second, &payload).unwrap_err();
    assert_eq!(err.code, ErrorCode::StaleSnapshot);
}

#[test]
fn hash_mismatch_on_put_is_schema_violation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    let payload = json!({"scheme": "eurovoc", "concept_count": 10});
    let mut manifest = manifest_for(&payload, "eurovoc", "1.0.0");
    manifest.hash = HashDigest::new(HashAlgorithm::Sha256, b"wrong");
    let err = store.put(&manifest, &payload).unwrap_err();
    assert_eq!(err.code, ErrorCode::SchemaViolation);
}

#[test]
fn tampered_payload_read_fails_closed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    let payload = json!({"scheme": "eurovoc", "concept_count": 10});
    let manifest = manifest_for(&payload, "eurovoc", "1.0.0");
    store.put(&manifest, &payload).expect("put");

    let blob_path = dir.path().join("store/payloads").join(&manifest.hash.value);
    std::fs::write(&blob_path, b"{\"scheme\":\"forged\",\"concept_count\":1}")
        .expect("tamper");

    let err = store.get_payload(&manifest.hash).unwrap_err();
    assert_eq!(err.code, ErrorCode::NondeterministicOutput, "read must abort on mismatch");
}

#[test]
fn mark_status_never_touches_manifest_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    let payload = json!({"scheme": "eurovoc", "concept_count": 10});
    let manifest = manifest_for(&payload, "eurovoc", "1.0.0");
    store.put(&manifest, &payload).expect("put");

    let manifest_path =
        dir.path().join("store/manifests").join(format!("{}.json", manifest.artifact_id));
    let before = std::fs::read(&manifest_path).expect("manifest bytes");

    store
        .mark_status(&manifest.artifact_id, ArtifactStatus::RolledBack, "regression")
        .expect("mark");
    assert_eq!(
        store.status(&manifest.artifact_id).expect("status"),
        ArtifactStatus::RolledBack
    );

    let after = std::fs::read(&manifest_path).expect("manifest bytes");
    assert_eq!(before, after, "manifest is immutable once committed");
}

#[test]
fn latest_manifest_orders_semantic_versions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    for (version, count) in [("1.0.0", 1), ("1.2.0", 2), ("1.10.0", 3)] {
        let payload = json!({"scheme": "eurovoc", "concept_count": count});
        let manifest = manifest_for(&payload, "eurovoc", version);
        store.put(&manifest, &payload).expect("put");
    }
    let latest = store
        .latest_manifest(
            ArtifactClass::KosSnapshot,
            &TenantId::new("acme").expect("tenant"),
            &Slug::new("eurovoc").expect("slug"),
        )
        .expect("latest")
        .expect("present");
    assert_eq!(latest.version, Version::new(1, 10, 0), "1.10.0 sorts above 1.2.0");
}

#[test]
fn list_manifests_feeds_lineage_rebuild() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path()).expect("open");
    for slug in ["a", "b", "c"] {
        let payload = json!({"scheme": slug, "concept_count": 1});
        let manifest = manifest_for(&payload, slug, "1.0.0");
        store.put(&manifest, &payload).expect("put");
    }
    let manifests = store.list_manifests().expect("list");
    assert_eq!(manifests.len(), 3);
}

// ============================================================================
// SECTION: Job Log
// ============================================================================

fn job_record(job_id: JobId, status: JobStatus) -> JobRecord {
    JobRecord {
        job_id,
        tenant: TenantId::new("acme").expect("tenant"),
        project: "legal".to_string(),
        job_type: "plan-build".to_string(),
        payload: json!({"plan": "legal-v1"}),
        payload_hash: HashDigest::new(HashAlgorithm::Sha256, b"payload"),
        actor: "producer@acme".into(),
        reason: "scheduled".to_string(),
        status,
        retries: 0,
        max_retries: 3,
        enqueued_at: Timestamp::from_unix_millis(0),
        started_at: None,
        ended_at: None,
        log_pointer: None,
        idempotency_key: format!("k-{job_id}"),
    }
}

#[test]
fn replay_returns_latest_state_per_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = FsJobLog::open(dir.path()).expect("open");
    let job = JobId::generate();
    log.append(&job_record(job, JobStatus::Queued)).expect("append");
    log.append(&job_record(job, JobStatus::Running)).expect("append");
    log.append(&job_record(job, JobStatus::Succeeded)).expect("append");

    let other = JobId::generate();
    log.append(&job_record(other, JobStatus::Queued)).expect("append");

    let replayed = log.replay().expect("replay");
    assert_eq!(replayed.len(), 2);
    let finished = replayed.iter().find(|record| record.job_id == job).expect("job");
    assert_eq!(finished.status, JobStatus::Succeeded);
    let queued = replayed.iter().find(|record| record.job_id == other).expect("other");
    assert_eq!(queued.status, JobStatus::Queued);
}

#[test]
fn compaction_preserves_replay_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = FsJobLog::open(dir.path()).expect("open");
    let job = JobId::generate();
    for status in [JobStatus::Queued, JobStatus::Running, JobStatus::Failed] {
        log.append(&job_record(job, status)).expect("append");
    }
    let before = log.replay().expect("replay");
    log.compact().expect("compact");
    let after = log.replay().expect("replay");
    assert_eq!(before, after);

    let raw = std::fs::read_to_string(dir.path().join("jobs/acme.log")).expect("log file");
    assert_eq!(raw.lines().count(), 1, "compaction keeps one line per job");
}
