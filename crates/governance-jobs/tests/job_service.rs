// crates/governance-jobs/tests/job_service.rs
// ============================================================================
// Module: Job Service Tests
// Description: Quota refusal, idempotency, FIFO order, retries, cancellation.
// ============================================================================
//! ## Overview
//! Drives the job service end to end over in-memory logs: concurrency-cap
//! refusals with recorded quota events, idempotent duplicate submissions,
//! FIFO start order within a tenant, exponential retry up to the budget,
//! cooperative cancellation, deadline timeouts, and restart recovery.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use governance_core::ActorId;
use governance_core::EventChainMac;
use governance_core::EventKind;
use governance_core::InMemoryEventLog;
use governance_core::JobRecord;
use governance_core::JobRequest;
use governance_core::JobStatus;
use governance_core::NoopTelemetry;
use governance_core::QuotaDimension;
use governance_core::QuotaLimits;
use governance_core::SystemClock;
use governance_core::TenantId;
use governance_core::interfaces::EventLog;
use governance_core::interfaces::JobLog;
use governance_core::memory::InMemoryJobLog;
use governance_jobs::EnqueueError;
use governance_jobs::HandlerError;
use governance_jobs::HandlerRegistry;
use governance_jobs::JobContext;
use governance_jobs::JobHandler;
use governance_jobs::JobOutcome;
use governance_jobs::JobService;
use governance_jobs::JobServiceConfig;
use governance_jobs::QuotaManager;
use serde_json::json;

/// Handler that succeeds immediately, recording the order of payload tags.
struct RecordingHandler {
    /// Observed payload tags in execution order.
    order: Arc<Mutex<Vec<String>>>,
}

impl JobHandler for RecordingHandler {
    fn run(&self, job: &JobRecord, ctx: &JobContext) -> Result<JobOutcome, HandlerError> {
        ctx.checkpoint()?;
        let tag = job.payload.get("tag").and_then(|tag| tag.as_str()).unwrap_or("?").to_string();
        self.order.lock().expect("order lock").push(tag);
        Ok(JobOutcome::default())
    }
}

/// Handler that fails transiently a fixed number of times.
struct FlakyHandler {
    /// Remaining failures before success.
    failures_left: AtomicU32,
}

impl JobHandler for FlakyHandler {
    fn run(&self, _job: &JobRecord, ctx: &JobContext) -> Result<JobOutcome, HandlerError> {
        ctx.checkpoint()?;
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(HandlerError::Transient("dependency flapped".to_string()));
        }
        Ok(JobOutcome {
            log_pointer: Some("logs/flaky".to_string()),
        })
    }
}

/// Handler that spins at checkpoints until canceled or timed out.
struct WaitingHandler;

impl JobHandler for WaitingHandler {
    fn run(&self, _job: &JobRecord, ctx: &JobContext) -> Result<JobOutcome, HandlerError> {
        loop {
            ctx.checkpoint()?;
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

fn tenant() -> TenantId {
    TenantId::new("acme").expect("tenant")
}

fn actor() -> ActorId {
    "scheduler@acme".into()
}

fn limits(max_concurrent: u32) -> QuotaLimits {
    QuotaLimits {
        max_concurrent_jobs: max_concurrent,
        max_jobs_per_window: 100,
        window_seconds: 60,
        cost_budget_units: 1_000,
    }
}

struct Rig {
    service: JobService,
    events: Arc<InMemoryEventLog>,
    job_log: Arc<InMemoryJobLog>,
}

fn rig(registry: HandlerRegistry, max_concurrent: u32, config: JobServiceConfig) -> Rig {
    let events =
        Arc::new(InMemoryEventLog::new(EventChainMac::new(b"jobs-secret").expect("mac")));
    let job_log = Arc::new(InMemoryJobLog::new());
    let quota = QuotaManager::new(limits(max_concurrent), BTreeMap::new());
    let service = JobService::new(
        config,
        registry,
        quota,
        Arc::clone(&job_log) as Arc<dyn JobLog>,
        Arc::clone(&events) as Arc<dyn EventLog>,
        Arc::new(SystemClock),
        Arc::new(NoopTelemetry),
    );
    Rig {
        service,
        events,
        job_log,
    }
}

fn request(tag: &str, key: Option<&str>) -> JobRequest {
    JobRequest {
        tenant: tenant(),
        project: "legal".to_string(),
        job_type: "plan-build".to_string(),
        payload: json!({"tag": tag}),
        actor: actor(),
        reason: "scheduled build".to_string(),
        idempotency_key: key.map(str::to_string),
    }
}

/// Polls until the job satisfies the predicate or the timeout expires.
fn wait_for(
    service: &JobService,
    job_id: &governance_core::JobId,
    what: &str,
    predicate: impl Fn(&JobRecord) -> bool,
) -> JobRecord {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(record) = service.get(job_id)
            && predicate(&record)
        {
            return record;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn concurrency_cap_refuses_with_quota_event() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let r = rig(registry, 2, JobServiceConfig::default());

    // At the cap: both submissions are accepted.
    r.service.enqueue(request("a", None)).expect("first accepted");
    r.service.enqueue(request("b", None)).expect("second accepted");

    // One above the cap: refused with the tripped limit and a retry hint.
    let err = r.service.enqueue(request("c", None)).unwrap_err();
    match err {
        EnqueueError::RateLimited(refusal) => {
            assert_eq!(refusal.limit, QuotaDimension::MaxConcurrentJobs);
            assert!(refusal.retry_after_seconds > 0);
        }
        EnqueueError::Rejected(other) => panic!("expected rate limit, got {other}"),
    }

    let events = r.events.read(&tenant(), 1, 100).expect("events");
    assert!(
        events.iter().any(|event| event.kind == EventKind::ServiceJobQuotaExceeded),
        "quota event must be written"
    );
}

#[test]
fn duplicate_idempotency_key_returns_original_record() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let r = rig(registry, 4, JobServiceConfig::default());

    let first = r.service.enqueue(request("a", Some("k1"))).expect("first");
    let second = r.service.enqueue(request("a", Some("k1"))).expect("duplicate");
    assert_eq!(second.job_id, first.job_id, "original record returned");

    let events = r.events.read(&tenant(), 1, 100).expect("events");
    let enqueued = events
        .iter()
        .filter(|event| event.kind == EventKind::ServiceJobEnqueued)
        .count();
    assert_eq!(enqueued, 1, "no duplicate event");

    let (_, usage) = r.service.quota_usage(&tenant());
    assert_eq!(usage.active_jobs, 1, "no second reservation");
}

#[test]
fn unknown_job_type_is_rejected_at_enqueue() {
    let registry = HandlerRegistry::new();
    let r = rig(registry, 4, JobServiceConfig::default());
    let err = r.service.enqueue(request("a", None)).unwrap_err();
    match err {
        EnqueueError::Rejected(error) => {
            assert_eq!(error.code, governance_core::ErrorCode::SchemaViolation);
        }
        EnqueueError::RateLimited(_) => panic!("expected schema violation"),
    }
}

#[test]
fn jobs_start_in_enqueue_order_within_a_tenant() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(
        "plan-build",
        Arc::new(RecordingHandler {
            order: Arc::clone(&order),
        }),
    );
    let config = JobServiceConfig {
        workers: 1,
        ..JobServiceConfig::default()
    };
    let r = rig(registry, 8, config);

    let ids: Vec<_> = ["first", "second", "third"]
        .iter()
        .map(|tag| r.service.enqueue(request(tag, None)).expect("enqueue").job_id)
        .collect();
    r.service.start();
    for id in &ids {
        wait_for(&r.service, id, "job completion", |record| {
            record.status == JobStatus::Succeeded
        });
    }
    r.service.shutdown();

    let observed = order.lock().expect("order lock").clone();
    assert_eq!(observed, vec!["first", "second", "third"], "FIFO within tenant");
}

#[test]
fn transient_failures_retry_with_preserved_key_then_succeed() {
    let mut registry = HandlerRegistry::new();
    registry.register(
        "plan-build",
        Arc::new(FlakyHandler {
            failures_left: AtomicU32::new(2),
        }),
    );
    let config = JobServiceConfig {
        workers: 1,
        backoff_base_ms: 2,
        backoff_cap_ms: 10,
        ..JobServiceConfig::default()
    };
    let r = rig(registry, 4, config);
    r.service.start();

    let record = r.service.enqueue(request("flaky", Some("k-flaky"))).expect("enqueue");
    let finished = wait_for(&r.service, &record.job_id, "retried success", |candidate| {
        candidate.status == JobStatus::Succeeded
    });
    r.service.shutdown();

    assert_eq!(finished.retries, 2, "two transient failures consumed retries");
    assert_eq!(finished.idempotency_key, "k-flaky", "retries preserve the key");
    assert_eq!(finished.log_pointer.as_deref(), Some("logs/flaky"));

    let events = r.events.read(&tenant(), 1, 100).expect("events");
    assert!(events.iter().any(|event| event.kind == EventKind::ServiceJobCompleted));
}

#[test]
fn retry_budget_exhaustion_fails_terminally() {
    let mut registry = HandlerRegistry::new();
    registry.register(
        "plan-build",
        Arc::new(FlakyHandler {
            failures_left: AtomicU32::new(10),
        }),
    );
    let config = JobServiceConfig {
        workers: 1,
        default_max_retries: 2,
        backoff_base_ms: 2,
        backoff_cap_ms: 10,
        ..JobServiceConfig::default()
    };
    let r = rig(registry, 4, config);
    r.service.start();

    let record = r.service.enqueue(request("doomed", None)).expect("enqueue");
    let finished = wait_for(&r.service, &record.job_id, "terminal failure", |candidate| {
        candidate.status == JobStatus::Failed
    });
    r.service.shutdown();

    assert_eq!(finished.retries, 2, "budget fully consumed");
    let events = r.events.read(&tenant(), 1, 100).expect("events");
    assert!(events.iter().any(|event| event.kind == EventKind::ServiceJobFailed));

    let (_, usage) = r.service.quota_usage(&tenant());
    assert_eq!(usage.active_jobs, 0, "reservation released at terminal state");
}

#[test]
fn queued_job_cancels_immediately_and_frees_its_key() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let r = rig(registry, 4, JobServiceConfig::default());

    let record = r.service.enqueue(request("idle", Some("k-cancel"))).expect("enqueue");
    let canceled = r.service.cancel(&record.job_id).expect("cancel");
    assert_eq!(canceled.status, JobStatus::Canceled);

    let (_, usage) = r.service.quota_usage(&tenant());
    assert_eq!(usage.active_jobs, 0, "reservation released");

    // The key is free again: a new submission creates a new job.
    let fresh = r.service.enqueue(request("idle", Some("k-cancel"))).expect("re-enqueue");
    assert_ne!(fresh.job_id, record.job_id);
}

#[test]
fn running_job_observes_cancellation_at_checkpoint() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let config = JobServiceConfig {
        workers: 1,
        ..JobServiceConfig::default()
    };
    let r = rig(registry, 4, config);
    r.service.start();

    let record = r.service.enqueue(request("spin", None)).expect("enqueue");
    wait_for(&r.service, &record.job_id, "job start", |candidate| {
        candidate.status == JobStatus::Running
    });
    r.service.cancel(&record.job_id).expect("cancel");
    let finished = wait_for(&r.service, &record.job_id, "cooperative cancel", |candidate| {
        candidate.status == JobStatus::Canceled
    });
    r.service.shutdown();
    assert!(finished.ended_at.is_some());
}

#[test]
fn deadline_expiry_times_out_and_respects_retry_budget() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let config = JobServiceConfig {
        workers: 1,
        default_max_retries: 0,
        default_deadline_ms: 20,
        ..JobServiceConfig::default()
    };
    let r = rig(registry, 4, config);
    r.service.start();

    let record = r.service.enqueue(request("slow", None)).expect("enqueue");
    let finished = wait_for(&r.service, &record.job_id, "timeout failure", |candidate| {
        candidate.status == JobStatus::Failed
    });
    r.service.shutdown();
    assert_eq!(finished.retries, 0);
}

#[test]
fn recovery_requeues_unfinished_jobs_and_rebuilds_quota() {
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let r = rig(registry, 4, JobServiceConfig::default());

    // Simulate a prior process: one unfinished, one finished job on the log.
    let unfinished = r.service.enqueue(request("resume", Some("k-resume"))).expect("enqueue");
    let mut done = unfinished.clone();
    done.job_id = governance_core::JobId::generate();
    done.idempotency_key = "k-done".to_string();
    done.status = JobStatus::Succeeded;
    r.job_log.append(&done).expect("seed finished job");

    // A fresh service over the same log recovers exactly the unfinished job.
    let mut registry = HandlerRegistry::new();
    registry.register("plan-build", Arc::new(WaitingHandler));
    let quota = QuotaManager::new(limits(4), BTreeMap::new());
    let service = JobService::new(
        JobServiceConfig::default(),
        registry,
        quota,
        Arc::clone(&r.job_log) as Arc<dyn JobLog>,
        Arc::clone(&r.events) as Arc<dyn EventLog>,
        Arc::new(SystemClock),
        Arc::new(NoopTelemetry),
    );
    let recovered = service.recover().expect("recover");
    assert_eq!(recovered, 1);

    let record = service.get(&unfinished.job_id).expect("recovered record");
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.idempotency_key, "k-resume");

    let (_, usage) = service.quota_usage(&tenant());
    assert_eq!(usage.active_jobs, 1, "reservation rebuilt from the log");
}
