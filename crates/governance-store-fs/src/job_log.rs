// crates/governance-store-fs/src/job_log.rs
// ============================================================================
// Module: Filesystem Job Log
// Description: Per-tenant append logs of job record transitions.
// Purpose: Recover unfinished jobs and quota counters after a restart.
// Dependencies: governance-core, serde_json
// ============================================================================

//! ## Overview
//! Every job transition appends the full [`JobRecord`] snapshot as one JSON
//! line under `jobs/<tenant>.log`. Replay folds the lines by job identifier,
//! last write wins, so the scheduler can re-queue unfinished work and rebuild
//! quota counters. Compaction rewrites each log down to the latest snapshot
//! per job through a temp file plus rename.

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
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use governance_core::GovernanceError;
use governance_core::JobId;
use governance_core::JobRecord;
use governance_core::interfaces::JobLog;

use crate::store::FsStoreError;

// ============================================================================
// SECTION: Job Log
// ============================================================================

/// Filesystem-backed job transition log.
///
/// # Invariants
/// - Appends serialize under the log mutex and flush before returning.
/// - Compaction preserves the latest snapshot of every job.
pub struct FsJobLog {
    /// Log root directory (`<root>/jobs`).
    root: PathBuf,
    /// Append serialization lock.
    write_lock: Mutex<()>,
}

impl FsJobLog {
    /// Opens (and creates) the job log root.
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::Io`] when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FsStoreError> {
        let root = root.into().join("jobs");
        fs::create_dir_all(&root).map_err(|err| FsStoreError::Io(err.to_string()))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the log path for a tenant.
    fn log_path(&self, tenant: &str) -> PathBuf {
        self.root.join(format!("{tenant}.log"))
    }

    /// Locks the write mutex, recovering from poisoning.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads every record from one tenant log file.
    fn read_file(&self, path: &PathBuf) -> Result<Vec<JobRecord>, GovernanceError> {
        let file = fs::File::open(path)
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line =
                line.map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: JobRecord = serde_json::from_str(&line).map_err(|err| {
                GovernanceError::from(FsStoreError::Corrupt(format!(
                    "job log line unparseable: {err}"
                )))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Lists existing tenant log paths.
    fn log_paths(&self) -> Result<Vec<PathBuf>, GovernanceError> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(&self.root)
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        for entry in entries {
            let entry = entry
                .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(".log") {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }
}

impl JobLog for FsJobLog {
    fn append(&self, record: &JobRecord) -> Result<(), GovernanceError> {
        let line = serde_json::to_string(record)
            .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
        let _guard = self.lock_writes();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(record.tenant.as_str()))
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        writeln!(file, "{line}")
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        file.sync_all()
            .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JobRecord>, GovernanceError> {
        let mut latest: BTreeMap<JobId, JobRecord> = BTreeMap::new();
        for path in self.log_paths()? {
            for record in self.read_file(&path)? {
                latest.insert(record.job_id, record);
            }
        }
        Ok(latest.into_values().collect())
    }

    fn compact(&self) -> Result<(), GovernanceError> {
        let _guard = self.lock_writes();
        for path in self.log_paths()? {
            let mut latest: BTreeMap<JobId, JobRecord> = BTreeMap::new();
            for record in self.read_file(&path)? {
                latest.insert(record.job_id, record);
            }
            let mut buffer = Vec::new();
            for record in latest.values() {
                let line = serde_json::to_string(record)
                    .map_err(|err| GovernanceError::schema_violation(err.to_string()))?;
                buffer.extend_from_slice(line.as_bytes());
                buffer.push(b'\n');
            }
            let tmp = path.with_extension("log.compacting");
            fs::write(&tmp, &buffer)
                .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
            fs::rename(&tmp, &path)
                .map_err(|err| GovernanceError::from(FsStoreError::Io(err.to_string())))?;
        }
        Ok(())
    }
}
