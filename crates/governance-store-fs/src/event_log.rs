// crates/governance-store-fs/src/event_log.rs
// ============================================================================
// Module: Filesystem Event Journal
// Description: Append-only, HMAC-chained per-tenant event logs on disk.
// Purpose: Durably record governance events and verify the chain on replay.
// Dependencies: governance-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One journal file per tenant under `events/<tenant>.log`, one JSON-encoded
//! [`EventRecord`] per line carrying `{seq, ts, actor, kind, subject_id,
//! payload, prev_hmac, hmac}`. Appends acquire the per-tenant mutex, read the
//! recovered tail, seal the record, and flush before releasing the lock;
//! write failures before the durable append assign no sequence. Reads and
//! startup recovery re-verify every returned link and fail closed on breaks.
//!
//! Security posture: journal bytes are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use governance_core::EventChainMac;
use governance_core::EventDraft;
use governance_core::EventRecord;
use governance_core::GovernanceError;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::core::event;
use governance_core::interfaces::EventLog;

use crate::store::FsStoreError;

// ============================================================================
// SECTION: Tenant Tail State
// ============================================================================

/// Recovered tail of a tenant journal.
#[derive(Debug, Clone)]
struct JournalTail {
    /// Last assigned sequence (zero when empty).
    seq: u64,
    /// Chain link of the last record (genesis seed when empty).
    hmac: String,
}

impl Default for JournalTail {
    fn default() -> Self {
        Self {
            seq: 0,
            hmac: event::GENESIS_PREV_HMAC.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Filesystem-backed event journal.
///
/// # Invariants
/// - Appends serialize under the per-tenant mutex; the critical section is
///   the HMAC computation plus the flushed write.
/// - The recovered tail always matches the last line on disk.
pub struct FsEventLog {
    /// Journal root directory (`<root>/events`).
    root: PathBuf,
    /// Chain MAC authority.
    mac: EventChainMac,
    /// Per-tenant tail state and append locks.
    tails: Mutex<BTreeMap<TenantId, Arc<Mutex<JournalTail>>>>,
}

impl FsEventLog {
    /// Opens (and creates) the journal root.
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::Io`] when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, mac: EventChainMac) -> Result<Self, FsStoreError> {
        let root = root.into().join("events");
        fs::create_dir_all(&root).map_err(|err| FsStoreError::Io(err.to_string()))?;
        Ok(Self {
            root,
            mac,
            tails: Mutex::new(BTreeMap::new()),
        })
    }

    /// Returns the journal path for a tenant.
    fn journal_path(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(format!("{tenant}.log"))
    }

    /// Returns (creating if needed) the tail cell for a tenant.
    ///
    /// First access scans the journal to recover the tail and verifies the
    /// whole chain, so a tampered journal is rejected before any append.
    fn tail_cell(&self, tenant: &TenantId) -> Result<Arc<Mutex<JournalTail>>, GovernanceError> {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cell) = tails.get(tenant) {
            return Ok(Arc::clone(cell));
        }
        let records = self.read_all(tenant)?;
        event::verify_chain(&self.mac, None, &records)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        let tail = records.last().map_or_else(JournalTail::default, |last| JournalTail {
            seq: last.seq,
            hmac: last.hmac.clone(),
        });
        let cell = Arc::new(Mutex::new(tail));
        tails.insert(tenant.clone(), Arc::clone(&cell));
        Ok(cell)
    }

    /// Reads every record in a tenant journal, without verification.
    fn read_all(&self, tenant: &TenantId) -> Result<Vec<EventRecord>, GovernanceError> {
        let path = self.journal_path(tenant);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line =
                line.map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(&line).map_err(|err| {
                GovernanceError::nondeterministic(format!("journal line unparseable: {err}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Locks a tail cell, recovering from poisoning.
    fn lock_tail(cell: &Arc<Mutex<JournalTail>>) -> MutexGuard<'_, JournalTail> {
        cell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventLog for FsEventLog {
    fn append(
        &self,
        tenant: &TenantId,
        ts: Timestamp,
        draft: EventDraft,
    ) -> Result<EventRecord, GovernanceError> {
        let cell = self.tail_cell(tenant)?;
        let mut tail = Self::lock_tail(&cell);
        let record = event::seal_event(
            &self.mac,
            tenant.clone(),
            tail.seq + 1,
            ts,
            &tail.hmac,
            draft,
        )
        .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        let line = serde_json::to_string(&record)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path(tenant))
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        writeln!(file, "{line}")
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        file.sync_all()
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        tail.seq = record.seq;
        tail.hmac.clone_from(&record.hmac);
        Ok(record)
    }

    fn read(
        &self,
        tenant: &TenantId,
        from_seq: u64,
        limit: usize,
    ) -> Result<Vec<EventRecord>, GovernanceError> {
        let records = self.read_all(tenant)?;
        let start = from_seq.max(1);
        let prior = if start > 1 {
            records.iter().find(|record| record.seq == start - 1)
        } else {
            None
        };
        let prior_link = prior.map(|record| (record.seq, record.hmac.as_str()));
        let slice: Vec<EventRecord> = records
            .iter()
            .filter(|record| record.seq >= start)
            .take(limit)
            .cloned()
            .collect();
        event::verify_chain(&self.mac, prior_link, &slice)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        Ok(slice)
    }

    fn latest_seq(&self, tenant: &TenantId) -> Result<u64, GovernanceError> {
        let cell = self.tail_cell(tenant)?;
        let tail = Self::lock_tail(&cell);
        Ok(tail.seq)
    }

    fn verify(&self, tenant: &TenantId) -> Result<u64, GovernanceError> {
        let records = self.read_all(tenant)?;
        event::verify_chain(&self.mac, None, &records)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        Ok(u64::try_from(records.len()).unwrap_or(u64::MAX))
    }

    fn tenants(&self) -> Result<Vec<TenantId>, GovernanceError> {
        let mut tenants = Vec::new();
        let entries = fs::read_dir(&self.root)
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        for entry in entries {
            let entry = entry
                .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".log") else {
                continue;
            };
            if let Ok(tenant) = TenantId::new(stem) {
                tenants.push(tenant);
            }
        }
        Ok(tenants)
    }
}
