// crates/governance-core/src/memory.rs
// ============================================================================
// Module: In-Memory Stores
// Description: Volatile reference implementations of the storage interfaces.
// Purpose: Back tests and memory-mode deployments without a filesystem.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory stores implement the same contracts as the durable filesystem
//! backends, including hash re-verification on every read path and HMAC
//! chaining on every append. They are the storage backend for tests and for
//! `memory` store mode; nothing here survives a restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde_json::Value;

use crate::core::artifact::ArtifactClass;
use crate::core::artifact::ArtifactStatus;
use crate::core::artifact::Manifest;
use crate::core::error::GovernanceError;
use crate::core::event;
use crate::core::event::EventDraft;
use crate::core::event::EventRecord;
use crate::core::hashing;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::Slug;
use crate::core::identifiers::TenantId;
use crate::core::job::JobRecord;
use crate::core::signing::EventChainMac;
use crate::core::time::Timestamp;
use crate::interfaces::ArtifactStore;
use crate::interfaces::EventLog;
use crate::interfaces::JobLog;

// ============================================================================
// SECTION: In-Memory Artifact Store
// ============================================================================

/// Mutable tables of the in-memory artifact store.
#[derive(Debug, Default)]
struct ArtifactTables {
    /// Payload blobs keyed by content hash value.
    payloads: BTreeMap<String, Value>,
    /// Manifests keyed by artifact identifier.
    manifests: BTreeMap<ArtifactId, Manifest>,
    /// Unique index from `(class, tenant, slug, version)` to artifact id.
    index: BTreeMap<String, ArtifactId>,
    /// Status side table.
    statuses: BTreeMap<ArtifactId, ArtifactStatus>,
}

/// Volatile artifact store for tests and memory mode.
///
/// # Invariants
/// - `put` inserts both tables or neither.
/// - Payload reads re-verify the content hash and fail closed.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    /// Store tables guarded by a single mutex.
    tables: Mutex<ArtifactTables>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, ArtifactTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds the unique index key for a manifest.
    fn index_key(manifest: &Manifest) -> String {
        manifest.key().to_string()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put(&self, manifest: &Manifest, payload: &Value) -> Result<(), GovernanceError> {
        let computed = hashing::hash_canonical_json(DEFAULT_HASH_ALGORITHM, payload)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        if computed != manifest.hash {
            return Err(GovernanceError::schema_violation(format!(
                "payload hash {} does not match manifest hash {}",
                computed.value, manifest.hash.value
            )));
        }
        let mut tables = self.lock();
        let key = Self::index_key(manifest);
        if tables.index.contains_key(&key) {
            return Err(GovernanceError::stale_snapshot(format!(
                "artifact key {key} already exists"
            )));
        }
        tables.payloads.insert(manifest.hash.value.clone(), payload.clone());
        tables.manifests.insert(manifest.artifact_id, manifest.clone());
        tables.index.insert(key, manifest.artifact_id);
        tables.statuses.insert(manifest.artifact_id, ArtifactStatus::Published);
        Ok(())
    }

    fn get_manifest(&self, id: &ArtifactId) -> Result<Manifest, GovernanceError> {
        self.lock().manifests.get(id).cloned().ok_or_else(|| {
            GovernanceError::source_unavailable(format!("unknown artifact {id}"))
        })
    }

    fn get_payload(&self, hash: &HashDigest) -> Result<Value, GovernanceError> {
        let payload = self.lock().payloads.get(&hash.value).cloned().ok_or_else(|| {
            GovernanceError::source_unavailable(format!("unknown payload hash {}", hash.value))
        })?;
        let computed = hashing::hash_canonical_json(hash.algorithm, &payload)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        if computed.value != hash.value {
            return Err(GovernanceError::nondeterministic(format!(
                "stored payload re-hashes to {} but was addressed as {}",
                computed.value, hash.value
            )));
        }
        Ok(payload)
    }

    fn status(&self, id: &ArtifactId) -> Result<ArtifactStatus, GovernanceError> {
        self.lock().statuses.get(id).copied().ok_or_else(|| {
            GovernanceError::source_unavailable(format!("unknown artifact {id}"))
        })
    }

    fn mark_status(
        &self,
        id: &ArtifactId,
        status: ArtifactStatus,
        _reason: &str,
    ) -> Result<(), GovernanceError> {
        let mut tables = self.lock();
        if !tables.manifests.contains_key(id) {
            return Err(GovernanceError::source_unavailable(format!("unknown artifact {id}")));
        }
        tables.statuses.insert(*id, status);
        Ok(())
    }

    fn latest_manifest(
        &self,
        class: ArtifactClass,
        tenant: &TenantId,
        slug: &Slug,
    ) -> Result<Option<Manifest>, GovernanceError> {
        let tables = self.lock();
        let latest = tables
            .manifests
            .values()
            .filter(|manifest| {
                manifest.class == class && manifest.tenant == *tenant && manifest.slug == *slug
            })
            .max_by(|a, b| a.version.cmp(&b.version))
            .cloned();
        Ok(latest)
    }

    fn list_manifests(&self) -> Result<Vec<Manifest>, GovernanceError> {
        Ok(self.lock().manifests.values().cloned().collect())
    }
}

// ============================================================================
// SECTION: In-Memory Event Log
// ============================================================================

/// Volatile per-tenant event journal with HMAC chaining.
///
/// # Invariants
/// - Appends serialize under the journal mutex; sequences never repeat.
/// - Reads re-verify the returned links and fail closed.
pub struct InMemoryEventLog {
    /// Chain MAC authority.
    mac: EventChainMac,
    /// Per-tenant journals.
    journals: Mutex<BTreeMap<TenantId, Vec<EventRecord>>>,
}

impl InMemoryEventLog {
    /// Creates an empty event log with the given chain authority.
    #[must_use]
    pub fn new(mac: EventChainMac) -> Self {
        Self {
            mac,
            journals: Mutex::new(BTreeMap::new()),
        }
    }

    /// Locks the journals, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<TenantId, Vec<EventRecord>>> {
        self.journals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventLog for InMemoryEventLog {
    fn append(
        &self,
        tenant: &TenantId,
        ts: Timestamp,
        draft: EventDraft,
    ) -> Result<EventRecord, GovernanceError> {
        let mut journals = self.lock();
        let journal = journals.entry(tenant.clone()).or_default();
        let (seq, prev_hmac) = match journal.last() {
            Some(last) => (last.seq + 1, last.hmac.clone()),
            None => (1, event::GENESIS_PREV_HMAC.to_string()),
        };
        let record = event::seal_event(&self.mac, tenant.clone(), seq, ts, &prev_hmac, draft)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        journal.push(record.clone());
        Ok(record)
    }

    fn read(
        &self,
        tenant: &TenantId,
        from_seq: u64,
        limit: usize,
    ) -> Result<Vec<EventRecord>, GovernanceError> {
        let journals = self.lock();
        let Some(journal) = journals.get(tenant) else {
            return Ok(Vec::new());
        };
        let start = from_seq.max(1);
        let slice: Vec<EventRecord> = journal
            .iter()
            .filter(|record| record.seq >= start)
            .take(limit)
            .cloned()
            .collect();
        let prior = if start > 1 {
            journal.iter().find(|record| record.seq == start - 1)
        } else {
            None
        };
        let prior_link = prior.map(|record| (record.seq, record.hmac.as_str()));
        event::verify_chain(&self.mac, prior_link, &slice)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        Ok(slice)
    }

    fn latest_seq(&self, tenant: &TenantId) -> Result<u64, GovernanceError> {
        Ok(self.lock().get(tenant).and_then(|journal| journal.last()).map_or(0, |last| last.seq))
    }

    fn verify(&self, tenant: &TenantId) -> Result<u64, GovernanceError> {
        let journals = self.lock();
        let Some(journal) = journals.get(tenant) else {
            return Ok(0);
        };
        event::verify_chain(&self.mac, None, journal)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        Ok(u64::try_from(journal.len()).unwrap_or(u64::MAX))
    }

    fn tenants(&self) -> Result<Vec<TenantId>, GovernanceError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

// ============================================================================
// SECTION: In-Memory Job Log
// ============================================================================

/// Volatile job transition log.
///
/// # Invariants
/// - Replay folds transitions by job identifier, last write wins.
#[derive(Debug, Default)]
pub struct InMemoryJobLog {
    /// Ordered transition snapshots.
    entries: Mutex<Vec<JobRecord>>,
}

impl InMemoryJobLog {
    /// Creates an empty job log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobLog for InMemoryJobLog {
    fn append(&self, record: &JobRecord) -> Result<(), GovernanceError> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).push(record.clone());
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JobRecord>, GovernanceError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut latest: BTreeMap<_, JobRecord> = BTreeMap::new();
        for record in entries.iter() {
            latest.insert(record.job_id, record.clone());
        }
        Ok(latest.into_values().collect())
    }

    fn compact(&self) -> Result<(), GovernanceError> {
        let compacted = self.replay()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        *entries = compacted;
        Ok(())
    }
}
