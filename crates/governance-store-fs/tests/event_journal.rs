// crates/governance-store-fs/tests/event_journal.rs
// ============================================================================
// Module: Filesystem Event Journal Tests
// Description: Durable chain recovery, restart replay, and tamper detection.
// ============================================================================
//! ## Overview
//! Validates that the on-disk journal survives process restarts with the
//! chain intact, that appends continue the recovered chain, and that a
//! tampered journal is rejected before any further append.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use governance_core::ErrorCode;
use governance_core::EventChainMac;
use governance_core::EventDraft;
use governance_core::EventKind;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::interfaces::EventLog;
use governance_store_fs::FsEventLog;
use serde_json::json;

fn mac() -> EventChainMac {
    EventChainMac::new(b"journal-secret").expect("mac")
}

fn tenant() -> TenantId {
    TenantId::new("acme").expect("tenant")
}

fn draft(subject: &str) -> EventDraft {
    EventDraft {
        actor: "auditor@acme".into(),
        kind: EventKind::ArtifactPublished,
        subject_id: subject.to_string(),
        payload: json!({"subject": subject}),
    }
}

fn ts(offset: i64) -> Timestamp {
    Timestamp::from_unix_millis(1_700_000_000_000 + offset)
}

#[test]
fn appends_assign_contiguous_sequences_and_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let log = FsEventLog::open(dir.path(), mac()).expect("open");
        for index in 0 .. 4 {
            let record = log.append(&tenant(), ts(index), draft("artifact-a")).expect("append");
            assert_eq!(record.seq, u64::try_from(index).expect("index") + 1);
        }
    }

    // A fresh instance over the same directory recovers the tail and
    // continues the chain.
    let log = FsEventLog::open(dir.path(), mac()).expect("reopen");
    assert_eq!(log.latest_seq(&tenant()).expect("latest"), 4);
    let record = log.append(&tenant(), ts(10), draft("artifact-b")).expect("append");
    assert_eq!(record.seq, 5);
    assert_eq!(log.verify(&tenant()).expect("verify"), 5);
}

#[test]
fn read_from_mid_sequence_self_verifies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = FsEventLog::open(dir.path(), mac()).expect("open");
    for index in 0 .. 6 {
        log.append(&tenant(), ts(index), draft("artifact")).expect("append");
    }
    let slice = log.read(&tenant(), 3, 2).expect("read");
    assert_eq!(slice.len(), 2);
    assert_eq!(slice[0].seq, 3);
    assert_eq!(slice[1].seq, 4);
}

#[test]
fn tampered_journal_is_rejected_before_append() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let log = FsEventLog::open(dir.path(), mac()).expect("open");
        for index in 0 .. 3 {
            log.append(&tenant(), ts(index), draft("artifact")).expect("append");
        }
    }

    // Corrupt the middle line of the journal on disk.
    let path = dir.path().join("events/acme.log");
    let raw = std::fs::read_to_string(&path).expect("journal");
    let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();
    lines[1] = lines[1].replace("artifact", "forged-subject");
    std::fs::write(&path, lines.join("\n") + "\n").expect("tamper");

    let log = FsEventLog::open(dir.path(), mac()).expect("reopen");
    let err = log.append(&tenant(), ts(99), draft("artifact")).unwrap_err();
    assert_eq!(err.code, ErrorCode::NondeterministicOutput);
}

#[test]
fn wrong_secret_fails_restart_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let log = FsEventLog::open(dir.path(), mac()).expect("open");
        log.append(&tenant(), ts(0), draft("artifact")).expect("append");
    }
    let other = FsEventLog::open(dir.path(), EventChainMac::new(b"other").expect("mac"))
        .expect("reopen");
    let err = other.verify(&tenant()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NondeterministicOutput);
}

#[test]
fn tenants_enumerates_existing_journals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = FsEventLog::open(dir.path(), mac()).expect("open");
    log.append(&tenant(), ts(0), draft("a")).expect("append");
    log.append(&TenantId::new("globex").expect("tenant"), ts(1), draft("b")).expect("append");
    let mut tenants: Vec<String> =
        log.tenants().expect("tenants").iter().map(ToString::to_string).collect();
    tenants.sort();
    assert_eq!(tenants, vec!["acme".to_string(), "globex".to_string()]);
}

#[test]
fn empty_journal_reads_and_verifies_clean() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = FsEventLog::open(dir.path(), mac()).expect("open");
    assert!(log.read(&tenant(), 1, 10).expect("read").is_empty());
    assert_eq!(log.verify(&tenant()).expect("verify"), 0);
    assert_eq!(log.latest_seq(&tenant()).expect("latest"), 0);
}
