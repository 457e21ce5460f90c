// crates/governance-jobs/src/service.rs
// ============================================================================
// Module: Job Service
// Description: Enqueue path, worker pool, retries, and lifecycle events.
// Purpose: Schedule handlers under quota decisions and record every transition.
// Dependencies: governance-core, rand, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The job service ties the board, the quota manager, the handler registry,
//! and the durable job log together. Enqueue computes the idempotency key,
//! returns the existing record for unfinished duplicates, reserves quota
//! before persisting anything, and emits `service_job_enqueued`. Worker
//! threads pull runnable jobs, run handlers behind a deadline and a
//! cancellation token, retry transient failures with exponential backoff and
//! jitter, and emit completion or failure events. Reservations are held from
//! enqueue until the terminal transition, so retries never re-enter the
//! quota gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use governance_core::ActorId;
use governance_core::Clock;
use governance_core::EventDraft;
use governance_core::EventKind;
use governance_core::GovernanceError;
use governance_core::JobId;
use governance_core::JobRecord;
use governance_core::JobRequest;
use governance_core::JobStatus;
use governance_core::QuotaDimension;
use governance_core::QuotaRefusal;
use governance_core::Telemetry;
use governance_core::TenantId;
use governance_core::TraceId;
use governance_core::core::telemetry::METRIC_JOB_DURATION_MS;
use governance_core::core::telemetry::METRIC_JOB_QUEUE_DEPTH;
use governance_core::core::telemetry::METRIC_JOB_RETRY_COUNT;
use governance_core::core::telemetry::METRIC_QUOTA_USAGE;
use governance_core::core::telemetry::MetricSample;
use governance_core::core::telemetry::OpRecord;
use governance_core::core::telemetry::OpStatus;
use governance_core::hashing;
use governance_core::hashing::DEFAULT_HASH_ALGORITHM;
use governance_core::interfaces::EventLog;
use governance_core::interfaces::JobLog;
use rand::Rng;
use serde_json::json;
use thiserror::Error;

use crate::handler::HandlerError;
use crate::handler::HandlerRegistry;
use crate::handler::JobContext;
use crate::queue::JobBoard;
use crate::quota::QuotaManager;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Job service tuning knobs.
///
/// # Invariants
/// - `workers` and `queue_capacity` are greater than zero.
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// Worker thread count.
    pub workers: usize,
    /// Bounded per-tenant queue capacity.
    pub queue_capacity: usize,
    /// Default retry budget for new jobs.
    pub default_max_retries: u32,
    /// Handler deadline in milliseconds from job start.
    pub default_deadline_ms: i64,
    /// Exponential backoff base in milliseconds.
    pub backoff_base_ms: u64,
    /// Exponential backoff cap in milliseconds.
    pub backoff_cap_ms: u64,
    /// Cost units charged for job types without an explicit entry.
    pub default_job_cost: u64,
    /// Cost units per job type.
    pub job_costs: BTreeMap<String, u64>,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            default_max_retries: 3,
            default_deadline_ms: 300_000,
            backoff_base_ms: 500,
            backoff_cap_ms: 60_000,
            default_job_cost: 1,
            job_costs: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Enqueue failures.
///
/// # Invariants
/// - `RateLimited` carries the refusal the HTTP surface serializes at 429.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// Quota or capacity refusal; retry after the suggested delay.
    #[error("rate limited on {}", .0.limit)]
    RateLimited(QuotaRefusal),
    /// Request rejected with a taxonomy error.
    #[error(transparent)]
    Rejected(#[from] GovernanceError),
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Shared service state referenced by workers.
struct ServiceInner {
    /// Tuning knobs.
    config: JobServiceConfig,
    /// Handler registry.
    handlers: HandlerRegistry,
    /// Scheduling board.
    board: JobBoard,
    /// Quota accounting.
    quota: QuotaManager,
    /// Durable job transition log.
    job_log: Arc<dyn JobLog>,
    /// Governance event journal.
    events: Arc<dyn EventLog>,
    /// Injected time source.
    clock: Arc<dyn Clock>,
    /// Telemetry sink.
    telemetry: Arc<dyn Telemetry>,
}

/// Job orchestration service with a worker pool.
///
/// # Invariants
/// - `shutdown` joins every worker before returning.
pub struct JobService {
    /// Shared state.
    inner: Arc<ServiceInner>,
    /// Worker join handles.
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl JobService {
    /// Creates a job service (workers are started separately).
    #[must_use]
    pub fn new(
        config: JobServiceConfig,
        handlers: HandlerRegistry,
        quota: QuotaManager,
        job_log: Arc<dyn JobLog>,
        events: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                handlers,
                board: JobBoard::new(),
                quota,
                job_log,
                events,
                clock,
                telemetry,
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Replays the durable log: re-queues unfinished jobs and rebuilds quota
    /// counters. Call before `start`.
    ///
    /// # Errors
    ///
    /// Returns a storage failure when the log cannot be replayed.
    pub fn recover(&self) -> Result<usize, GovernanceError> {
        let records = self.inner.job_log.replay()?;
        let now = self.inner.clock.now();
        let config = &self.inner.config;
        self.inner.quota.rebuild(&records, now, |job_type| {
            config.job_costs.get(job_type).copied().unwrap_or(config.default_job_cost)
        });
        let mut recovered = 0;
        for mut record in records {
            if record.status.is_terminal() {
                continue;
            }
            // Interrupted executions resume from the queue; the idempotency
            // key is preserved so handlers can dedupe partial work.
            record.status = JobStatus::Queued;
            self.inner.board.restore(record);
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Starts the worker pool.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0 .. self.inner.config.workers {
            let inner = Arc::clone(&self.inner);
            workers.push(thread::spawn(move || worker_loop(&inner)));
        }
    }

    /// Signals shutdown and joins every worker.
    pub fn shutdown(&self) {
        self.inner.board.shutdown();
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in workers.drain(..) {
            // A worker that died early still lets shutdown proceed.
            let _join = handle.join();
        }
    }

    /// Enqueues a job request.
    ///
    /// Unfinished duplicates by idempotency key return the original record
    /// without a new reservation or event.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Rejected`] for unknown job types and storage
    /// failures, and [`EnqueueError::RateLimited`] on quota refusal.
    pub fn enqueue(&self, request: JobRequest) -> Result<JobRecord, EnqueueError> {
        let inner = &self.inner;
        let started = Instant::now();
        if !inner.handlers.contains(&request.job_type) {
            return Err(EnqueueError::Rejected(GovernanceError::schema_violation(format!(
                "unknown job type {}",
                request.job_type
            ))));
        }
        let payload_hash = hashing::hash_canonical_json(DEFAULT_HASH_ALGORITHM, &request.payload)
            .map_err(|err| EnqueueError::Rejected(GovernanceError::schema_violation(
                err.to_string(),
            )))?;
        let idempotency_key = request.idempotency_key.clone().unwrap_or_else(|| {
            hashing::hash_bytes(
                DEFAULT_HASH_ALGORITHM,
                format!("{}:{}", request.job_type, payload_hash.value).as_bytes(),
            )
            .value
        });

        if let Some(existing) = inner.board.find_unfinished(&request.tenant, &idempotency_key) {
            return Ok(existing);
        }

        let now = inner.clock.now();
        let cost = inner
            .config
            .job_costs
            .get(&request.job_type)
            .copied()
            .unwrap_or(inner.config.default_job_cost);
        if let Err(refusal) = inner.quota.reserve(&request.tenant, cost, now) {
            inner.emit_quota_exceeded(&request, &idempotency_key, refusal);
            inner.record_op(&request.tenant, "enqueue", OpStatus::Error, started);
            return Err(EnqueueError::RateLimited(refusal));
        }

        let record = JobRecord {
            job_id: JobId::generate(),
            tenant: request.tenant.clone(),
            project: request.project.clone(),
            job_type: request.job_type.clone(),
            payload: request.payload.clone(),
            payload_hash,
            actor: request.actor.clone(),
            reason: request.reason.clone(),
            status: JobStatus::Queued,
            retries: 0,
            max_retries: inner.config.default_max_retries,
            enqueued_at: now,
            started_at: None,
            ended_at: None,
            log_pointer: None,
            idempotency_key,
        };

        if !inner.board.insert_queued(record.clone(), inner.config.queue_capacity) {
            inner.quota.release(&request.tenant);
            let refusal = QuotaRefusal {
                limit: QuotaDimension::QueueCapacity,
                retry_after_seconds: 5,
            };
            inner.emit_quota_exceeded(&request, &record.idempotency_key, refusal);
            inner.record_op(&request.tenant, "enqueue", OpStatus::Error, started);
            return Err(EnqueueError::RateLimited(refusal));
        }

        if let Err(err) = inner.job_log.append(&record) {
            // Nothing durable happened; undo the in-memory admission.
            let _removed = inner.board.take_queued(&record.job_id);
            let mut canceled = record;
            canceled.status = JobStatus::Canceled;
            inner.board.update(canceled);
            inner.quota.release(&request.tenant);
            inner.record_op(&request.tenant, "enqueue", OpStatus::Error, started);
            return Err(EnqueueError::Rejected(err));
        }

        inner.emit_event(
            &record.tenant,
            &record.actor,
            EventKind::ServiceJobEnqueued,
            &record.job_id.to_string(),
            json!({
                "job_type": record.job_type,
                "idempotency_key": record.idempotency_key,
            }),
        );
        inner.gauge_queue_depth(&record.tenant);
        inner.record_op(&record.tenant, "enqueue", OpStatus::Ok, started);
        Ok(record)
    }

    /// Returns a job record by identifier.
    #[must_use]
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.inner.board.get(job_id)
    }

    /// Returns the current quota usage snapshot for a tenant.
    #[must_use]
    pub fn quota_usage(
        &self,
        tenant: &TenantId,
    ) -> (governance_core::QuotaLimits, governance_core::core::job::QuotaUsage) {
        let now = self.inner.clock.now();
        (self.inner.quota.limits_for(tenant), self.inner.quota.usage(tenant, now))
    }

    /// Requests cancellation of a job.
    ///
    /// Queued jobs cancel immediately; running jobs observe the token at
    /// their next suspension point.
    ///
    /// # Errors
    ///
    /// Returns `SOURCE_UNAVAILABLE` for unknown job identifiers.
    pub fn cancel(&self, job_id: &JobId) -> Result<JobRecord, GovernanceError> {
        let inner = &self.inner;
        let record = inner
            .board
            .get(job_id)
            .ok_or_else(|| GovernanceError::source_unavailable(format!("unknown job {job_id}")))?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        if let Some(queued) = inner.board.take_queued(job_id) {
            let finalized = inner.finalize(queued, JobStatus::Canceled, None, None);
            return Ok(finalized);
        }
        if let Some(token) = inner.board.token(job_id) {
            token.cancel();
        }
        inner.board.notify();
        Ok(record)
    }
}

// ============================================================================
// SECTION: Worker Loop
// ============================================================================

/// Worker thread body: pull runnable jobs until shutdown.
fn worker_loop(inner: &Arc<ServiceInner>) {
    loop {
        let now = inner.clock.now();
        match inner.board.pop_ready(now, Duration::from_millis(200)) {
            Some(record) => run_job(inner, record),
            None => {
                if inner.board.is_shutdown() {
                    break;
                }
            }
        }
    }
}

/// Executes one job attempt and applies the outcome transition.
fn run_job(inner: &Arc<ServiceInner>, record: JobRecord) {
    let started_wall = Instant::now();
    let token = inner.board.token(&record.job_id).unwrap_or_default();
    if token.is_canceled() {
        inner.finalize_and_discard(record, JobStatus::Canceled, None, None);
        return;
    }

    let mut running = record;
    let now = inner.clock.now();
    running.status = JobStatus::Running;
    if running.started_at.is_none() {
        running.started_at = Some(now);
    }
    inner.board.update(running.clone());
    inner.persist(&running);

    let deadline = now.plus_millis(inner.config.default_deadline_ms);
    let ctx = JobContext::new(
        running.payload.clone(),
        deadline,
        token,
        Arc::clone(&inner.clock),
    );
    let outcome = match inner.handlers.resolve(&running.job_type) {
        Some(handler) => handler.run(&running, &ctx),
        None => Err(HandlerError::Terminal(GovernanceError::schema_violation(format!(
            "handler for {} disappeared after registration",
            running.job_type
        )))),
    };

    match outcome {
        Ok(done) => {
            inner.record_metric_duration(&running, started_wall);
            inner.finalize_and_discard(running, JobStatus::Succeeded, done.log_pointer, None);
        }
        Err(HandlerError::Canceled) => {
            inner.finalize_and_discard(running, JobStatus::Canceled, None, None);
        }
        Err(error) if error.is_retryable() && running.retries < running.max_retries => {
            inner.schedule_retry(running, &error);
        }
        Err(error) => {
            inner.record_metric_duration(&running, started_wall);
            inner.finalize_and_discard(
                running,
                JobStatus::Failed,
                None,
                Some(error.to_string()),
            );
        }
    }
}

impl ServiceInner {
    /// Applies a terminal transition and returns the final record.
    fn finalize(
        &self,
        record: JobRecord,
        status: JobStatus,
        log_pointer: Option<String>,
        failure: Option<String>,
    ) -> JobRecord {
        let mut finished = record;
        finished.status = status;
        finished.ended_at = Some(self.clock.now());
        if log_pointer.is_some() {
            finished.log_pointer = log_pointer;
        }
        self.board.update(finished.clone());
        self.persist(&finished);
        self.quota.release(&finished.tenant);
        let (kind, payload) = match status {
            JobStatus::Succeeded => (
                EventKind::ServiceJobCompleted,
                json!({"retries": finished.retries}),
            ),
            JobStatus::Canceled => (
                EventKind::ServiceJobFailed,
                json!({"outcome": "canceled"}),
            ),
            _ => (
                EventKind::ServiceJobFailed,
                json!({"retries": finished.retries, "error": failure}),
            ),
        };
        self.emit_event(
            &finished.tenant,
            &finished.actor,
            kind,
            &finished.job_id.to_string(),
            payload,
        );
        self.gauge_queue_depth(&finished.tenant);
        finished
    }

    /// `finalize` without returning the record (worker paths).
    fn finalize_and_discard(
        &self,
        record: JobRecord,
        status: JobStatus,
        log_pointer: Option<String>,
        failure: Option<String>,
    ) {
        let _finished = self.finalize(record, status, log_pointer, failure);
    }

    /// Schedules a retry with exponential backoff and jitter.
    fn schedule_retry(&self, record: JobRecord, error: &HandlerError) {
        let mut retrying = record;
        retrying.retries += 1;
        retrying.status = JobStatus::Retrying;
        self.persist(&retrying);
        self.telemetry.record_metric(
            &MetricSample::counter(METRIC_JOB_RETRY_COUNT, 1)
                .with_label("type", retrying.job_type.clone()),
        );
        self.telemetry.record_op(&OpRecord {
            ts: self.clock.now(),
            tenant: Some(retrying.tenant.clone()),
            component: "job_service",
            op: "retry",
            status: OpStatus::Error,
            duration_ms: 0,
            trace_id: TraceId::new(error.to_string()),
        });
        let exponent = retrying.retries.saturating_sub(1).min(16);
        let backoff = self
            .config
            .backoff_base_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.config.backoff_cap_ms);
        let jitter = rand::thread_rng().gen_range(0 .. self.config.backoff_base_ms.max(1));
        let due = self
            .clock
            .now()
            .plus_millis(i64::try_from(backoff + jitter).unwrap_or(i64::MAX));
        // Retries keep their reservation and idempotency key; only the event
        // sequence observing them advances.
        self.board.schedule_retry(retrying, due);
    }

    /// Appends a record snapshot to the durable log, reporting failures.
    fn persist(&self, record: &JobRecord) {
        if let Err(err) = self.job_log.append(record) {
            self.telemetry.record_op(&OpRecord {
                ts: self.clock.now(),
                tenant: Some(record.tenant.clone()),
                component: "job_service",
                op: "persist",
                status: OpStatus::Error,
                duration_ms: 0,
                trace_id: TraceId::new(err.code.as_str()),
            });
        }
    }

    /// Appends a lifecycle event, reporting failures via telemetry.
    fn emit_event(
        &self,
        tenant: &TenantId,
        actor: &ActorId,
        kind: EventKind,
        subject_id: &str,
        payload: serde_json::Value,
    ) {
        let draft = EventDraft {
            actor: actor.clone(),
            kind,
            subject_id: subject_id.to_string(),
            payload,
        };
        if let Err(err) = self.events.append(tenant, self.clock.now(), draft) {
            self.telemetry.record_op(&OpRecord {
                ts: self.clock.now(),
                tenant: Some(tenant.clone()),
                component: "job_service",
                op: "emit_event",
                status: OpStatus::Error,
                duration_ms: 0,
                trace_id: TraceId::new(err.code.as_str()),
            });
        }
    }

    /// Emits the quota-exceeded event for a refused request.
    fn emit_quota_exceeded(&self, request: &JobRequest, key: &str, refusal: QuotaRefusal) {
        self.emit_event(
            &request.tenant,
            &request.actor,
            EventKind::ServiceJobQuotaExceeded,
            key,
            json!({
                "job_type": request.job_type,
                "limit": refusal.limit,
                "retry_after_seconds": refusal.retry_after_seconds,
            }),
        );
    }

    /// Publishes the queue depth gauge for a tenant.
    fn gauge_queue_depth(&self, tenant: &TenantId) {
        let depth = u64::try_from(self.board.depth(tenant)).unwrap_or(u64::MAX);
        self.telemetry.record_metric(
            &MetricSample::gauge(METRIC_JOB_QUEUE_DEPTH, depth)
                .with_label("tenant", tenant.to_string()),
        );
        let usage = self.quota.usage(tenant, self.clock.now());
        let dimensions = [
            ("max_concurrent_jobs", u64::from(usage.active_jobs)),
            ("max_jobs_per_window", u64::from(usage.jobs_in_window)),
            ("cost_budget_units", usage.cost_used_units),
        ];
        for (dimension, value) in dimensions {
            self.telemetry.record_metric(
                &MetricSample::gauge(METRIC_QUOTA_USAGE, value)
                    .with_label("tenant", tenant.to_string())
                    .with_label("dimension", dimension),
            );
        }
    }

    /// Records the job duration histogram.
    fn record_metric_duration(&self, record: &JobRecord, started: Instant) {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.telemetry.record_metric(
            &MetricSample::histogram(METRIC_JOB_DURATION_MS, elapsed)
                .with_label("type", record.job_type.clone()),
        );
    }

    /// Records a structured op line for the enqueue surface.
    fn record_op(&self, tenant: &TenantId, op: &'static str, status: OpStatus, started: Instant) {
        self.telemetry.record_op(&OpRecord {
            ts: self.clock.now(),
            tenant: Some(tenant.clone()),
            component: "job_service",
            op,
            status,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            trace_id: TraceId::generate(),
        });
    }
}
