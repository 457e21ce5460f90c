// crates/governance-store-fs/src/store.rs
// ============================================================================
// Module: Filesystem Artifact Store
// Description: Durable ArtifactStore backed by a content-addressed directory tree.
// Purpose: Persist payload blobs, canonical manifests, a version index, and
//          status side rows with fail-closed integrity checks.
// Dependencies: governance-core, semver, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`ArtifactStore`] over a plain directory
//! tree. Payloads are stored once per content hash; manifests are stored as
//! canonical JSON; the `(class, tenant, slug, version)` index enforces
//! uniqueness. Loads verify integrity via recomputed hashes and fail closed
//! on corruption. Status transitions are side-table writes and never touch
//! committed manifest bytes.
//!
//! Security posture: directory contents are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use governance_core::ArtifactClass;
use governance_core::ArtifactId;
use governance_core::ArtifactStatus;
use governance_core::GovernanceError;
use governance_core::HashDigest;
use governance_core::Manifest;
use governance_core::Slug;
use governance_core::TenantId;
use governance_core::hashing;
use governance_core::interfaces::ArtifactStore;
use semver::Version;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Filesystem store errors.
///
/// # Invariants
/// - Error messages avoid embedding payload bytes.
#[derive(Debug, Error, Clone)]
pub enum FsStoreError {
    /// Store I/O error.
    #[error("fs store io error: {0}")]
    Io(String),
    /// Stored data is corrupt or hash-mismatched.
    #[error("fs store corruption: {0}")]
    Corrupt(String),
    /// Requested entity is missing.
    #[error("fs store missing: {0}")]
    Missing(String),
    /// Version key collision.
    #[error("fs store conflict: {0}")]
    Conflict(String),
    /// Invalid store data or request.
    #[error("fs store invalid data: {0}")]
    Invalid(String),
}

impl From<FsStoreError> for GovernanceError {
    fn from(error: FsStoreError) -> Self {
        match error {
            FsStoreError::Io(message) | FsStoreError::Invalid(message) => {
                Self::schema_violation(message)
            }
            FsStoreError::Corrupt(message) => Self::nondeterministic(message),
            FsStoreError::Missing(message) => Self::source_unavailable(message),
            FsStoreError::Conflict(message) => Self::stale_snapshot(message),
        }
    }
}

// ============================================================================
// SECTION: Status Rows
// ============================================================================

/// Status side-table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRow {
    /// Current lifecycle status.
    status: ArtifactStatus,
    /// Operator-supplied reason for the latest transition.
    reason: String,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Filesystem-backed artifact store.
///
/// # Invariants
/// - Mutations serialize under the store mutex so index checks and inserts
///   are atomic with respect to one another.
/// - Payload reads re-verify content hashes before returning.
pub struct FsArtifactStore {
    /// Store root directory (`<root>/store/...`).
    root: PathBuf,
    /// Write serialization lock.
    write_lock: Mutex<()>,
}

impl FsArtifactStore {
    /// Opens (and creates) a filesystem store under the given root.
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::Io`] when the directory tree cannot be
    /// created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FsStoreError> {
        let root = root.into();
        for sub in ["store/payloads", "store/manifests", "store/index", "store/status"] {
            fs::create_dir_all(root.join(sub))
                .map_err(|err| FsStoreError::Io(err.to_string()))?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the payload blob path for a content hash.
    fn payload_path(&self, hash: &HashDigest) -> PathBuf {
        self.root.join("store/payloads").join(&hash.value)
    }

    /// Returns the manifest path for an artifact identifier.
    fn manifest_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join("store/manifests").join(format!("{id}.json"))
    }

    /// Returns the index directory for a slug series.
    fn index_dir(&self, class: ArtifactClass, tenant: &TenantId, slug: &Slug) -> PathBuf {
        self.root
            .join("store/index")
            .join(class.as_str())
            .join(tenant.as_str())
            .join(slug.as_str())
    }

    /// Returns the status row path for an artifact identifier.
    fn status_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join("store/status").join(format!("{id}.json"))
    }

    /// Locks the write mutex, recovering from poisoning.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads and integrity-checks a manifest file.
    fn load_manifest(&self, id: &ArtifactId) -> Result<Manifest, FsStoreError> {
        let path = self.manifest_path(id);
        let bytes = fs::read(&path).map_err(|_| {
            FsStoreError::Missing(format!("manifest for artifact {id} is not present"))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|err| FsStoreError::Corrupt(format!("manifest {id} unparseable: {err}")))?;
        if manifest.artifact_id != *id {
            return Err(FsStoreError::Corrupt(format!(
                "manifest file {id} claims artifact {}",
                manifest.artifact_id
            )));
        }
        Ok(manifest)
    }

    /// Loads a status row, defaulting committed manifests to `Published`.
    fn load_status(&self, id: &ArtifactId) -> Result<ArtifactStatus, FsStoreError> {
        let path = self.status_path(id);
        if !path.exists() {
            // Status rows are written at put time; an absent row on a
            // committed manifest reads as publishable.
            self.load_manifest(id)?;
            return Ok(ArtifactStatus::Published);
        }
        let bytes = fs::read(&path).map_err(|err| FsStoreError::Io(err.to_string()))?;
        let row: StatusRow = serde_json::from_slice(&bytes)
            .map_err(|err| FsStoreError::Corrupt(format!("status row {id}: {err}")))?;
        Ok(row.status)
    }
}

/// Writes bytes through a temp file plus rename in the target directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FsStoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| FsStoreError::Invalid(format!("path {} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|err| FsStoreError::Io(err.to_string()))?;
    let tmp = parent.join(format!(
        ".tmp-{}",
        path.file_name().and_then(|name| name.to_str()).unwrap_or("blob")
    ));
    {
        let mut file =
            fs::File::create(&tmp).map_err(|err| FsStoreError::Io(err.to_string()))?;
        file.write_all(bytes).map_err(|err| FsStoreError::Io(err.to_string()))?;
        file.sync_all().map_err(|err| FsStoreError::Io(err.to_string()))?;
    }
    fs::rename(&tmp, path).map_err(|err| FsStoreError::Io(err.to_string()))?;
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, manifest: &Manifest, payload: &Value) -> Result<(), GovernanceError> {
        let canonical = hashing::canonical_json_bytes(payload)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        let computed = hashing::hash_bytes(manifest.hash.algorithm, &canonical);
        if computed != manifest.hash {
            return Err(GovernanceError::schema_violation(format!(
                "payload hash {} does not match manifest hash {}",
                computed.value, manifest.hash.value
            )));
        }

        let _guard = self.lock_writes();
        let index_dir = self.index_dir(manifest.class, &manifest.tenant, &manifest.slug);
        let index_path = index_dir.join(manifest.version.to_string());
        if index_path.exists() {
            return Err(GovernanceError::stale_snapshot(format!(
                "artifact key {} already exists",
                manifest.key()
            )));
        }

        let manifest_bytes = hashing::canonical_json_bytes(manifest)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;

        // Insert both tables or neither: the index row is written last and is
        // the commit marker; stray blobs without an index row are unreachable
        // and harmless.
        write_atomic(&self.payload_path(&manifest.hash), &canonical)
            .map_err(GovernanceError::from)?;
        write_atomic(&self.manifest_path(&manifest.artifact_id), &manifest_bytes)
            .map_err(GovernanceError::from)?;
        let status = StatusRow {
            status: ArtifactStatus::Published,
            reason: String::new(),
        };
        let status_bytes = serde_json::to_vec(&status)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        write_atomic(&self.status_path(&manifest.artifact_id), &status_bytes)
            .map_err(GovernanceError::from)?;
        write_atomic(&index_path, manifest.artifact_id.to_string().as_bytes())
            .map_err(GovernanceError::from)?;
        Ok(())
    }

    fn get_manifest(&self, id: &ArtifactId) -> Result<Manifest, GovernanceError> {
        self.load_manifest(id).map_err(GovernanceError::from)
    }

    fn get_payload(&self, hash: &HashDigest) -> Result<Value, GovernanceError> {
        let path = self.payload_path(hash);
        let bytes = fs::read(&path).map_err(|_| {
            GovernanceError::source_unavailable(format!("unknown payload hash {}", hash.value))
        })?;
        let recomputed = hashing::hash_bytes(hash.algorithm, &bytes);
        if recomputed.value != hash.value {
            return Err(GovernanceError::nondeterministic(format!(
                "stored payload re-hashes to {} but was addressed as {}",
                recomputed.value, hash.value
            )));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))
    }

    fn status(&self, id: &ArtifactId) -> Result<ArtifactStatus, GovernanceError> {
        self.load_status(id).map_err(GovernanceError::from)
    }

    fn mark_status(
        &self,
        id: &ArtifactId,
        status: ArtifactStatus,
        reason: &str,
    ) -> Result<(), GovernanceError> {
        let _guard = self.lock_writes();
        self.load_manifest(id).map_err(GovernanceError::from)?;
        let row = StatusRow {
            status,
            reason: reason.to_string(),
        };
        let bytes = serde_json::to_vec(&row)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        write_atomic(&self.status_path(id), &bytes).map_err(GovernanceError::from)
    }

    fn latest_manifest(
        &self,
        class: ArtifactClass,
        tenant: &TenantId,
        slug: &Slug,
    ) -> Result<Option<Manifest>, GovernanceError> {
        let index_dir = self.index_dir(class, tenant, slug);
        if !index_dir.exists() {
            return Ok(None);
        }
        let mut best: Option<(Version, ArtifactId)> = None;
        let entries =
            fs::read_dir(&index_dir).map_err(|err| FsStoreError::Io(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| FsStoreError::Io(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let version = Version::parse(name).map_err(|err| {
                FsStoreError::Corrupt(format!("index entry {name} is not a version: {err}"))
            })?;
            let raw = fs::read_to_string(entry.path())
                .map_err(|err| FsStoreError::Io(err.to_string()))?;
            let id: ArtifactId = serde_json::from_value(Value::String(raw.trim().to_string()))
                .map_err(|err| {
                    FsStoreError::Corrupt(format!("index row {name} holds no artifact id: {err}"))
                })?;
            let better = best.as_ref().is_none_or(|(current, _)| version > *current);
            if better {
                best = Some((version, id));
            }
        }
        match best {
            Some((_, id)) => Ok(Some(self.load_manifest(&id)?)),
            None => Ok(None),
        }
    }

    fn list_manifests(&self) -> Result<Vec<Manifest>, GovernanceError> {
        let dir = self.root.join("store/manifests");
        let mut manifests = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|err| FsStoreError::Io(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| FsStoreError::Io(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let bytes =
                fs::read(entry.path()).map_err(|err| FsStoreError::Io(err.to_string()))?;
            let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|err| {
                FsStoreError::Corrupt(format!("manifest file {name} unparseable: {err}"))
            })?;
            manifests.push(manifest);
        }
        Ok(manifests)
    }
}
