// crates/governance-jobs/src/queue.rs
// ============================================================================
// Module: Job Board
// Description: Per-tenant FIFO queues, idempotency index, and retry schedule.
// Purpose: Hand workers the next runnable job in enqueue order per tenant.
// Dependencies: governance-core
// ============================================================================

//! ## Overview
//! The board owns the in-memory scheduling state: bounded per-tenant FIFO
//! queues, the job record table, the unfinished-idempotency-key index, the
//! delayed retry schedule, and the cancellation tokens. Workers block on the
//! board's condition variable and wake on enqueue, retry-due, cancellation,
//! or shutdown. Within a tenant jobs are handed out in enqueue order; across
//! tenants a rotating cursor keeps dispatch fair.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use governance_core::JobId;
use governance_core::JobRecord;
use governance_core::JobStatus;
use governance_core::TenantId;
use governance_core::Timestamp;

use crate::handler::CancellationToken;

// ============================================================================
// SECTION: Board State
// ============================================================================

/// Mutable scheduling state guarded by the board mutex.
#[derive(Default)]
struct BoardState {
    /// Ready queues per tenant, in enqueue order.
    queues: BTreeMap<TenantId, VecDeque<JobId>>,
    /// Job record table.
    records: BTreeMap<JobId, JobRecord>,
    /// Unfinished jobs by `(tenant, idempotency_key)`.
    unfinished: BTreeMap<(TenantId, String), JobId>,
    /// Delayed retries: `(due unix ms, job)`.
    delayed: Vec<(i64, JobId)>,
    /// Cancellation tokens for queued and running jobs.
    tokens: BTreeMap<JobId, CancellationToken>,
    /// Round-robin cursor over tenants.
    cursor: usize,
    /// Shutdown flag observed by waiting workers.
    shutdown: bool,
}

// ============================================================================
// SECTION: Job Board
// ============================================================================

/// Scheduling board shared between the service and its workers.
///
/// # Invariants
/// - Every queued or delayed job has a record and a cancellation token.
/// - `unfinished` indexes exactly the jobs whose status is non-terminal.
pub struct JobBoard {
    /// Scheduling state.
    state: Mutex<BoardState>,
    /// Wakeup signal for workers.
    ready: Condvar,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BoardState::default()),
            ready: Condvar::new(),
        }
    }

    /// Locks the board state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the unfinished job for an idempotency key, when any.
    #[must_use]
    pub fn find_unfinished(&self, tenant: &TenantId, key: &str) -> Option<JobRecord> {
        let state = self.lock();
        let job_id = state.unfinished.get(&(tenant.clone(), key.to_string()))?;
        state.records.get(job_id).cloned()
    }

    /// Returns a job record by identifier.
    #[must_use]
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.lock().records.get(job_id).cloned()
    }

    /// Returns the ready-queue depth for a tenant.
    #[must_use]
    pub fn depth(&self, tenant: &TenantId) -> usize {
        self.lock().queues.get(tenant).map_or(0, VecDeque::len)
    }

    /// Inserts a freshly queued job, enforcing the per-tenant capacity.
    ///
    /// Returns `false` without inserting when the tenant queue is full.
    #[must_use]
    pub fn insert_queued(&self, record: JobRecord, capacity: usize) -> bool {
        let mut state = self.lock();
        let queue = state.queues.entry(record.tenant.clone()).or_default();
        if queue.len() >= capacity {
            return false;
        }
        queue.push_back(record.job_id);
        let key = (record.tenant.clone(), record.idempotency_key.clone());
        state.unfinished.insert(key, record.job_id);
        state.tokens.insert(record.job_id, CancellationToken::new());
        state.records.insert(record.job_id, record);
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Re-inserts a recovered job during startup replay (no capacity check).
    pub fn restore(&self, record: JobRecord) {
        let mut state = self.lock();
        state.queues.entry(record.tenant.clone()).or_default().push_back(record.job_id);
        let key = (record.tenant.clone(), record.idempotency_key.clone());
        state.unfinished.insert(key, record.job_id);
        state.tokens.insert(record.job_id, CancellationToken::new());
        state.records.insert(record.job_id, record);
        drop(state);
        self.ready.notify_one();
    }

    /// Updates a job record snapshot in place.
    pub fn update(&self, record: JobRecord) {
        let mut state = self.lock();
        if record.status.is_terminal() {
            let key = (record.tenant.clone(), record.idempotency_key.clone());
            state.unfinished.remove(&key);
            state.tokens.remove(&record.job_id);
        }
        state.records.insert(record.job_id, record);
    }

    /// Schedules a retry attempt at the given due time.
    pub fn schedule_retry(&self, record: JobRecord, due: Timestamp) {
        let mut state = self.lock();
        state.delayed.push((due.as_unix_millis(), record.job_id));
        state.records.insert(record.job_id, record);
        drop(state);
        self.ready.notify_one();
    }

    /// Returns the cancellation token for a job, when it is still tracked.
    #[must_use]
    pub fn token(&self, job_id: &JobId) -> Option<CancellationToken> {
        self.lock().tokens.get(job_id).cloned()
    }

    /// Removes a queued job for immediate cancellation.
    ///
    /// Returns the record when the job was still waiting in a queue.
    #[must_use]
    pub fn take_queued(&self, job_id: &JobId) -> Option<JobRecord> {
        let mut state = self.lock();
        let record = state.records.get(job_id)?.clone();
        if record.status != JobStatus::Queued {
            return None;
        }
        if let Some(queue) = state.queues.get_mut(&record.tenant) {
            queue.retain(|queued| queued != job_id);
        }
        Some(record)
    }

    /// Pops the next runnable job, promoting due retries first.
    ///
    /// Blocks up to `wait` when nothing is runnable. Returns `None` on
    /// timeout or shutdown.
    #[must_use]
    pub fn pop_ready(&self, now: Timestamp, wait: Duration) -> Option<JobRecord> {
        let mut state = self.lock();
        promote_due_retries(&mut state, now);
        if let Some(record) = pop_round_robin(&mut state) {
            return Some(record);
        }
        if state.shutdown {
            return None;
        }
        let (mut state, _timeout) = self
            .ready
            .wait_timeout(state, wait)
            .unwrap_or_else(PoisonError::into_inner);
        promote_due_retries(&mut state, now);
        if state.shutdown {
            return None;
        }
        pop_round_robin(&mut state)
    }

    /// Signals shutdown and wakes every waiting worker.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.ready.notify_all();
    }

    /// Returns whether shutdown was signaled.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Wakes workers (used after external state changes).
    pub fn notify(&self) {
        self.ready.notify_one();
    }
}

/// Moves due delayed retries back onto their tenant queues.
fn promote_due_retries(state: &mut BoardState, now: Timestamp) {
    let now_ms = now.as_unix_millis();
    let mut remaining = Vec::with_capacity(state.delayed.len());
    let delayed = std::mem::take(&mut state.delayed);
    for (due, job_id) in delayed {
        if due <= now_ms {
            if let Some(record) = state.records.get(&job_id) {
                state.queues.entry(record.tenant.clone()).or_default().push_back(job_id);
            }
        } else {
            remaining.push((due, job_id));
        }
    }
    state.delayed = remaining;
}

/// Pops the front job of the next non-empty tenant queue (round robin).
fn pop_round_robin(state: &mut BoardState) -> Option<JobRecord> {
    let tenants: Vec<TenantId> = state.queues.keys().cloned().collect();
    if tenants.is_empty() {
        return None;
    }
    let start = state.cursor % tenants.len();
    for offset in 0 .. tenants.len() {
        let tenant = &tenants[(start + offset) % tenants.len()];
        if let Some(queue) = state.queues.get_mut(tenant)
            && let Some(job_id) = queue.pop_front()
        {
            state.cursor = (start + offset + 1) % tenants.len();
            return state.records.get(&job_id).cloned();
        }
    }
    None
}
