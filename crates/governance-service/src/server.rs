// crates/governance-service/src/server.rs
// ============================================================================
// Module: HTTP Server
// Description: Axum router, handlers, and taxonomy-to-status mapping.
// Purpose: Expose the registry and job service over HTTP/JSON.
// Dependencies: axum, governance-config, governance-core, governance-jobs,
//               governance-store-fs, tokio
// ============================================================================

//! ## Overview
//! The wire protocol of the registry: artifact publish and retrieval, atomic
//! rollback, job submission under quotas, quota inspection, release gate
//! evaluation, waiver lifecycle, self-verifying event streaming, and health
//! probes. Taxonomy codes map to status codes exactly once, here:
//! `SCHEMA_VIOLATION` 400, `STALE_SNAPSHOT` 409, `POLICY_VIOLATION` and
//! `LICENSING_BLOCK` 422, `SOURCE_UNAVAILABLE` 404, `RATE_LIMITED` 429 with
//! `Retry-After`, `NONDETERMINISTIC_OUTPUT` 500, `TIMEOUT` 504, and
//! `AUTH_FAILED` 401 (missing headers) or 403 (insufficient roles).
//!
//! Security posture: every request is untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use governance_config::GovernanceConfig;
use governance_config::StoreMode;
use governance_core::Approval;
use governance_core::ArtifactClass;
use governance_core::ArtifactId;
use governance_core::Clock;
use governance_core::Ed25519Signer;
use governance_core::EnvironmentFingerprint;
use governance_core::ErrorCode;
use governance_core::EventChainMac;
use governance_core::GatePolicy;
use governance_core::GovernanceError;
use governance_core::GovernanceRegistry;
use governance_core::HashDigest;
use governance_core::InMemoryArtifactStore;
use governance_core::InMemoryEventLog;
use governance_core::JobId;
use governance_core::JobRequest;
use governance_core::KeyId;
use governance_core::Manifest;
use governance_core::PromptRef;
use governance_core::Proposal;
use governance_core::QuotaRefusal;
use governance_core::RegistryPolicy;
use governance_core::RegistryServices;
use governance_core::Slug;
use governance_core::SystemClock;
use governance_core::Telemetry;
use governance_core::TenantId;
use governance_core::Timestamp;
use governance_core::UpstreamPin;
use governance_core::MetricSample;
use governance_core::Waiver;
use governance_core::WaiverId;
use governance_core::WaiverScope;
use governance_core::WaiverStatus;
use governance_core::core::telemetry::METRIC_EVENT_CHAIN_VERIFICATIONS_TOTAL;
use governance_core::hashing;
use governance_core::interfaces::ArtifactStore;
use governance_core::interfaces::EventLog;
use governance_core::interfaces::JobLog;
use governance_core::memory::InMemoryJobLog;
use governance_jobs::EnqueueError;
use governance_jobs::HandlerRegistry;
use governance_jobs::JobService;
use governance_jobs::JobServiceConfig;
use governance_jobs::QuotaManager;
use governance_store_fs::FsArtifactStore;
use governance_store_fs::FsEventLog;
use governance_store_fs::FsJobLog;
use semver::Version;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuditIdentity;
use crate::sweeper;
use crate::telemetry::StderrTelemetry;

// ============================================================================
// SECTION: Service Errors
// ============================================================================

/// HTTP-surface error wrapper.
///
/// # Invariants
/// - `Forbidden` is reserved for callers with valid headers but missing
///   roles; every other auth failure is `Governance` with `AUTH_FAILED`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Taxonomy error mapped by code.
    #[error(transparent)]
    Governance(#[from] GovernanceError),
    /// Valid identity lacking a required role.
    #[error("forbidden: {0}")]
    Forbidden(GovernanceError),
    /// Quota refusal with retry hint.
    #[error("rate limited on {}", .0.limit)]
    RateLimited(QuotaRefusal),
}

impl From<EnqueueError> for ServiceError {
    fn from(error: EnqueueError) -> Self {
        match error {
            EnqueueError::RateLimited(refusal) => Self::RateLimited(refusal),
            EnqueueError::Rejected(inner) => Self::Governance(inner),
        }
    }
}

/// JSON error body returned for every failure.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable taxonomy code.
    code: ErrorCode,
    /// Human-readable failure description.
    message: String,
    /// Remediation hint.
    remediation: String,
}

/// Maps a taxonomy code to its status code.
const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::SchemaViolation => StatusCode::BAD_REQUEST,
        ErrorCode::StaleSnapshot => StatusCode::CONFLICT,
        ErrorCode::PolicyViolation | ErrorCode::LicensingBlock => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorCode::SourceUnavailable => StatusCode::NOT_FOUND,
        ErrorCode::NondeterministicOutput => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::AuthFailed => StatusCode::UNAUTHORIZED,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Governance(error) => {
                let body = ErrorBody {
                    code: error.code,
                    message: error.message,
                    remediation: error.remediation,
                };
                (status_for(body.code), Json(body)).into_response()
            }
            Self::Forbidden(error) => {
                let body = ErrorBody {
                    code: error.code,
                    message: error.message,
                    remediation: error.remediation,
                };
                (StatusCode::FORBIDDEN, Json(body)).into_response()
            }
            Self::RateLimited(refusal) => {
                let body = json!({
                    "limit": refusal.limit,
                    "retry_after_seconds": refusal.retry_after_seconds,
                });
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, refusal.retry_after_seconds.to_string())],
                    Json(body),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Governance registry facade.
    pub registry: Arc<GovernanceRegistry>,
    /// Job orchestration service.
    pub jobs: Arc<JobService>,
    /// Event journal handle for streaming reads.
    pub events: Arc<dyn EventLog>,
    /// Durable job log handle for compaction.
    pub job_log: Arc<dyn JobLog>,
    /// Injected time source.
    pub clock: Arc<dyn Clock>,
    /// Signing key identifier used for server-side signing.
    pub signing_key: KeyId,
    /// Sweeper configuration carried to the background task.
    pub sweeper: governance_config::SweeperConfig,
}

/// Build-time failures assembling the service.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration rejected.
    #[error("config rejected: {0}")]
    Config(String),
    /// Store initialization failed.
    #[error("store init failed: {0}")]
    Store(String),
    /// Signing key material rejected.
    #[error("signing init failed: {0}")]
    Signing(String),
}

/// Assembles application state from validated configuration.
///
/// # Errors
///
/// Returns [`BuildError`] when configuration validation, store opening, key
/// loading, or startup replay fails.
pub fn build_state(
    config: &GovernanceConfig,
    handlers: HandlerRegistry,
) -> Result<AppState, BuildError> {
    config.validate().map_err(|err| BuildError::Config(err.to_string()))?;
    let mac = EventChainMac::new(config.events.secret.as_bytes())
        .map_err(|err| BuildError::Config(err.to_string()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let telemetry: Arc<dyn Telemetry> = Arc::new(StderrTelemetry);

    let (store, events, job_log): (Arc<dyn ArtifactStore>, Arc<dyn EventLog>, Arc<dyn JobLog>) =
        match config.store.mode {
            StoreMode::Memory => (
                Arc::new(InMemoryArtifactStore::new()),
                Arc::new(InMemoryEventLog::new(mac)),
                Arc::new(InMemoryJobLog::new()),
            ),
            StoreMode::Filesystem => {
                let root = &config.store.root;
                let store = FsArtifactStore::open(root)
                    .map_err(|err| BuildError::Store(err.to_string()))?;
                let events = FsEventLog::open(root, mac)
                    .map_err(|err| BuildError::Store(err.to_string()))?;
                let job_log =
                    FsJobLog::open(root).map_err(|err| BuildError::Store(err.to_string()))?;
                (Arc::new(store), Arc::new(events), Arc::new(job_log))
            }
        };

    let mut signer = Ed25519Signer::new();
    let key_id = KeyId::new(config.signing.key_id.clone());
    if let Some(seed) = &config.signing.seed_base64 {
        signer
            .add_signing_key(key_id.clone(), seed)
            .map_err(|err| BuildError::Signing(err.to_string()))?;
    }
    for (verify_key_id, public) in &config.signing.verifying_keys {
        signer
            .add_verifying_key(KeyId::new(verify_key_id.clone()), public)
            .map_err(|err| BuildError::Signing(err.to_string()))?;
    }

    let services = RegistryServices {
        store,
        events: Arc::clone(&events),
        clock: Arc::clone(&clock),
        telemetry: Arc::clone(&telemetry),
    };
    let policy = RegistryPolicy {
        forbidden_license_tags: config
            .licensing
            .forbidden_tags
            .iter()
            .cloned()
            .collect::<BTreeSet<String>>(),
    };
    let registry = GovernanceRegistry::new(services, signer, policy)
        .map_err(|err| BuildError::Store(err.to_string()))?;

    let quota = QuotaManager::new(
        config.jobs.default_quota.into(),
        config
            .jobs
            .tenant_quotas
            .iter()
            .filter_map(|(tenant, limits)| {
                TenantId::new(tenant.clone()).ok().map(|tenant| (tenant, (*limits).into()))
            })
            .collect::<BTreeMap<_, _>>(),
    );
    let job_config = JobServiceConfig {
        workers: config.jobs.workers,
        queue_capacity: config.jobs.queue_capacity,
        default_max_retries: config.jobs.default_max_retries,
        default_deadline_ms: config.jobs.default_deadline_ms,
        backoff_base_ms: config.jobs.backoff_base_ms,
        backoff_cap_ms: config.jobs.backoff_cap_ms,
        default_job_cost: config.jobs.default_job_cost,
        job_costs: config.jobs.job_costs.clone(),
    };
    let jobs = JobService::new(
        job_config,
        handlers,
        quota,
        Arc::clone(&job_log),
        Arc::clone(&events),
        Arc::clone(&clock),
        telemetry,
    );
    jobs.recover().map_err(|err| BuildError::Store(err.to_string()))?;

    Ok(AppState {
        registry: Arc::new(registry),
        jobs: Arc::new(jobs),
        events,
        job_log,
        clock,
        signing_key: key_id,
        sweeper: config.sweeper.clone(),
    })
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the wire-protocol router over the application state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/artifacts", post(publish_artifact))
        .route("/artifacts/{id}", get(get_artifact))
        .route("/artifacts/{id}/payload", get(get_artifact_payload))
        .route("/artifacts/{id}/lineage", get(get_artifact_lineage))
        .route("/artifacts/{id}/rollback", post(rollback_artifact))
        .route("/jobs", post(enqueue_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/logs", get(get_job_logs))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/quotas", get(get_quotas))
        .route("/release/evaluate", post(evaluate_release))
        .route("/waivers", post(propose_waiver))
        .route("/waivers/{id}", get(get_waiver))
        .route("/waivers/{id}/approve", post(approve_waiver))
        .route("/waivers/{id}/revoke", post(revoke_waiver))
        .route("/events", get(stream_events))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Runs the service until interrupted.
///
/// # Errors
///
/// Returns [`BuildError`] when state assembly fails, or an I/O error string
/// when the listener cannot bind.
pub async fn serve(
    config: GovernanceConfig,
    handlers: HandlerRegistry,
) -> Result<(), BuildError> {
    let state = build_state(&config, handlers)?;
    state.jobs.start();
    sweeper::spawn(state.clone());
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|err| BuildError::Config(format!("bind {}: {err}", config.server.bind)))?;
    axum::serve(listener, router)
        .await
        .map_err(|err| BuildError::Config(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Artifact Handlers
// ============================================================================

/// Body of `POST /artifacts`.
#[derive(Debug, Deserialize)]
struct ProposalRequest {
    /// Artifact class.
    class: ArtifactClass,
    /// Artifact slug.
    slug: Slug,
    /// Declared semantic version.
    version: Version,
    /// Human-readable title.
    title: String,
    /// Human-readable summary.
    summary: String,
    /// License tag.
    license_tag: String,
    /// Policy pack hash in force.
    policy_pack_hash: HashDigest,
    /// Change-control reference code.
    change_reason_code: String,
    /// Declared change impact.
    change_impact: governance_core::ChangeImpact,
    /// Upstream pins.
    #[serde(default)]
    upstream: Vec<UpstreamPin>,
    /// Referenced waivers.
    #[serde(default)]
    waivers: Vec<WaiverId>,
    /// Build environment fingerprint.
    #[serde(default)]
    environment_fingerprint: EnvironmentFingerprint,
    /// Collected signed approvals.
    #[serde(default)]
    approvals: Vec<Approval>,
    /// Prompt template references.
    #[serde(default)]
    prompt_refs: Vec<PromptRef>,
    /// Superseded artifact, when correcting.
    #[serde(default)]
    supersedes: Option<ArtifactId>,
    /// External audit outcome (defaults to pass when the class has no
    /// external auditor wired).
    #[serde(default)]
    audit_passed: Option<bool>,
    /// Artifact payload.
    payload: Value,
}

/// `POST /artifacts`: drive a proposal through the pipeline and publish.
async fn publish_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProposalRequest>,
) -> Result<(StatusCode, Json<Manifest>), ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    let now = state.clock.now();
    let draft = Manifest {
        artifact_id: ArtifactId::generate(),
        class: request.class,
        tenant: identity.tenant.clone(),
        slug: request.slug,
        version: request.version,
        hash: HashDigest {
            algorithm: governance_core::HashAlgorithm::Sha256,
            value: String::new(),
        },
        title: request.title,
        summary: request.summary,
        license_tag: request.license_tag,
        policy_pack_hash: request.policy_pack_hash,
        creator: identity.actor.clone(),
        created_at: now,
        change_reason_code: request.change_reason_code,
        change_impact: request.change_impact,
        upstream: request.upstream,
        approvals: Vec::new(),
        waivers: request.waivers,
        environment_fingerprint: EnvironmentFingerprint::default(),
        prompt_refs: request.prompt_refs,
        supersedes: request.supersedes,
        signature: None,
    };

    let mut proposal = Proposal::propose(state.registry.schemas(), draft, request.payload)?;
    proposal.attach_build(request.environment_fingerprint)?;
    proposal.record_audit(request.audit_passed.unwrap_or(true))?;
    for approval in request.approvals {
        proposal.approve(approval)?;
    }
    proposal.sign(state.registry.signer(), &state.signing_key)?;

    let registry = Arc::clone(&state.registry);
    let manifest = tokio::task::spawn_blocking(move || registry.publish(proposal))
        .await
        .map_err(|err| {
            ServiceError::Governance(GovernanceError::nondeterministic(err.to_string()))
        })??;
    Ok((StatusCode::CREATED, Json(manifest)))
}

/// Parses an artifact identifier path segment.
fn parse_artifact_id(raw: &str) -> Result<ArtifactId, ServiceError> {
    Uuid::parse_str(raw).map(ArtifactId::new).map_err(|_| {
        ServiceError::Governance(GovernanceError::schema_violation(format!(
            "artifact id {raw} is not a UUID"
        )))
    })
}

/// `GET /artifacts/{id}`: manifest with payload hash re-verified.
async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Manifest>, ServiceError> {
    let id = parse_artifact_id(&id)?;
    let manifest = state.registry.services().store.get_manifest(&id)?;
    // Read path integrity: the payload must still hash to the manifest hash.
    state.registry.services().store.get_payload(&manifest.hash)?;
    Ok(Json(manifest))
}

/// `GET /artifacts/{id}/payload`: canonical payload bytes with `ETag`.
async fn get_artifact_payload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_artifact_id(&id)?;
    let manifest = state.registry.services().store.get_manifest(&id)?;
    let payload = state.registry.services().store.get_payload(&manifest.hash)?;
    let bytes = hashing::canonical_json_bytes(&payload)
        .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
    let response = (
        StatusCode::OK,
        [
            (header::ETAG, format!("\"{}\"", manifest.hash.value)),
            (header::CONTENT_TYPE, "application/json".to_string()),
        ],
        bytes,
    )
        .into_response();
    Ok(response)
}

/// `GET /artifacts/{id}/lineage`: transitive closures.
async fn get_artifact_lineage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let id = parse_artifact_id(&id)?;
    state.registry.services().store.get_manifest(&id)?;
    let ancestors = state.registry.ancestors(&id);
    let descendants = state.registry.descendants(&id);
    Ok(Json(json!({"ancestors": ancestors, "descendants": descendants})))
}

/// Body of `POST /artifacts/{id}/rollback`.
#[derive(Debug, Deserialize)]
struct RollbackRequest {
    /// Operator-supplied rollback reason.
    reason: String,
}

/// `POST /artifacts/{id}/rollback`: terminal status plus warning events.
async fn rollback_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<Value>, ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    let id = parse_artifact_id(&id)?;
    let registry = Arc::clone(&state.registry);
    let actor = identity.actor.clone();
    let warned = tokio::task::spawn_blocking(move || {
        registry.rollback(&id, &actor, &request.reason)
    })
    .await
    .map_err(|err| ServiceError::Governance(GovernanceError::nondeterministic(err.to_string())))??;
    Ok(Json(json!({"rolled_back": id, "warned_descendants": warned})))
}

// ============================================================================
// SECTION: Job Handlers
// ============================================================================

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize)]
struct JobSubmission {
    /// Tenant identifier (must match `X-Tenant`).
    tenant: TenantId,
    /// Project label.
    project: String,
    /// Handler type key.
    job_type: String,
    /// Job payload.
    payload: Value,
    /// Optional idempotency key.
    #[serde(default)]
    idempotency_key: Option<String>,
}

/// `POST /jobs`: enqueue under quota.
async fn enqueue_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<JobSubmission>,
) -> Result<(StatusCode, Json<governance_core::JobRecord>), ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    if submission.tenant != identity.tenant {
        return Err(ServiceError::Forbidden(GovernanceError::auth_failed(
            "body tenant does not match X-Tenant",
        )));
    }
    let request = JobRequest {
        tenant: submission.tenant,
        project: submission.project,
        job_type: submission.job_type,
        payload: submission.payload,
        actor: identity.actor,
        reason: identity.reason,
        idempotency_key: submission.idempotency_key,
    };
    let record = state.jobs.enqueue(request)?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Parses a job identifier path segment.
fn parse_job_id(raw: &str) -> Result<JobId, ServiceError> {
    Uuid::parse_str(raw).map(JobId::new).map_err(|_| {
        ServiceError::Governance(GovernanceError::schema_violation(format!(
            "job id {raw} is not a UUID"
        )))
    })
}

/// `GET /jobs/{id}`: job record.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<governance_core::JobRecord>, ServiceError> {
    let id = parse_job_id(&id)?;
    state.jobs.get(&id).map(Json).ok_or_else(|| {
        ServiceError::Governance(GovernanceError::source_unavailable(format!(
            "unknown job {id}"
        )))
    })
}

/// `GET /jobs/{id}/logs`: captured handler log pointer as plain text.
async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_job_id(&id)?;
    let record = state.jobs.get(&id).ok_or_else(|| {
        ServiceError::Governance(GovernanceError::source_unavailable(format!(
            "unknown job {id}"
        )))
    })?;
    let body = record.log_pointer.unwrap_or_default();
    let response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string())],
        body,
    )
        .into_response();
    Ok(response)
}

/// `POST /jobs/{id}/cancel`: cooperative cancellation.
async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<governance_core::JobRecord>, ServiceError> {
    AuditIdentity::from_headers(&headers)?;
    let id = parse_job_id(&id)?;
    let record = state.jobs.cancel(&id)?;
    Ok(Json(record))
}

/// Query of `GET /quotas`.
#[derive(Debug, Deserialize)]
struct QuotaQuery {
    /// Tenant to inspect.
    tenant: TenantId,
}

/// `GET /quotas?tenant=`: limits and current usage.
async fn get_quotas(
    State(state): State<AppState>,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<Value>, ServiceError> {
    let (limits, usage) = state.jobs.quota_usage(&query.tenant);
    Ok(Json(json!({
        "tenant": query.tenant,
        "limits": limits,
        "usage": usage,
    })))
}

// ============================================================================
// SECTION: Release Gate Handler
// ============================================================================

/// Body of `POST /release/evaluate`.
#[derive(Debug, Deserialize)]
struct ReleaseEvaluationRequest {
    /// Release manifest artifact identifier.
    manifest_id: ArtifactId,
    /// Gate policy pack.
    policy_pack: GatePolicy,
}

/// `POST /release/evaluate`: gate decision with recorded event.
async fn evaluate_release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReleaseEvaluationRequest>,
) -> Result<Json<governance_core::GateDecision>, ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    let registry = Arc::clone(&state.registry);
    let actor = identity.actor.clone();
    let decision = tokio::task::spawn_blocking(move || {
        registry.evaluate_release(&request.manifest_id, &request.policy_pack, &actor)
    })
    .await
    .map_err(|err| ServiceError::Governance(GovernanceError::nondeterministic(err.to_string())))??;
    Ok(Json(decision))
}

// ============================================================================
// SECTION: Waiver Handlers
// ============================================================================

/// Body of `POST /waivers`.
#[derive(Debug, Deserialize)]
struct WaiverRequest {
    /// Waiver identifier.
    waiver_id: WaiverId,
    /// Scope of the exception.
    scope: WaiverScope,
    /// Why the exception is needed.
    justification: String,
    /// Mitigation in place while the exception holds.
    mitigation: String,
    /// Expiry timestamp (unix milliseconds, exclusive).
    expires_at: Timestamp,
    /// Advisory references.
    #[serde(default)]
    advisory_refs: Vec<String>,
}

/// `POST /waivers`: propose a waiver.
async fn propose_waiver(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WaiverRequest>,
) -> Result<(StatusCode, Json<Waiver>), ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    let waiver = Waiver {
        waiver_id: request.waiver_id,
        tenant: identity.tenant,
        scope: request.scope,
        owner: identity.actor,
        justification: request.justification,
        mitigation: request.mitigation,
        created_at: state.clock.now(),
        expires_at: request.expires_at,
        status: WaiverStatus::Proposed,
        advisory_refs: request.advisory_refs,
    };
    let waiver = state.registry.propose_waiver(waiver)?;
    Ok((StatusCode::CREATED, Json(waiver)))
}

/// `GET /waivers/{id}`: waiver record.
async fn get_waiver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Waiver>, ServiceError> {
    let waiver_id = WaiverId::new(id);
    state.registry.get_waiver(&waiver_id).map(Json).ok_or_else(|| {
        ServiceError::Governance(GovernanceError::source_unavailable(format!(
            "unknown waiver {waiver_id}"
        )))
    })
}

/// `POST /waivers/{id}/approve`: requires the `governance` role.
async fn approve_waiver(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Waiver>, ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    identity.require_any_role(&["governance"]).map_err(ServiceError::Forbidden)?;
    let waiver = state.registry.approve_waiver(
        &WaiverId::new(id),
        &"governance".into(),
        &identity.actor,
    )?;
    Ok(Json(waiver))
}

/// `POST /waivers/{id}/revoke`: owner or governance revocation.
async fn revoke_waiver(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Waiver>, ServiceError> {
    let identity = AuditIdentity::from_headers(&headers)?;
    let waiver = state.registry.revoke_waiver(&WaiverId::new(id), &identity.actor)?;
    Ok(Json(waiver))
}

// ============================================================================
// SECTION: Event Streaming and Health
// ============================================================================

/// Query of `GET /events`.
#[derive(Debug, Deserialize)]
struct EventQuery {
    /// Tenant journal to stream.
    tenant: TenantId,
    /// First sequence to return (defaults to 1).
    #[serde(default)]
    from_seq: Option<u64>,
    /// Maximum events per response chunk.
    #[serde(default)]
    limit: Option<usize>,
}

/// `GET /events?tenant=&from_seq=`: newline-delimited, chain-verified events.
async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Response, ServiceError> {
    let from_seq = query.from_seq.unwrap_or(1);
    let limit = query.limit.unwrap_or(1_000).min(10_000);
    let events = state.events.read(&query.tenant, from_seq, limit)?;
    // Every returned chunk re-verified its chain links inside `read`.
    state.registry.services().telemetry.record_metric(&MetricSample::counter(
        METRIC_EVENT_CHAIN_VERIFICATIONS_TOTAL,
        1,
    ));
    let mut body = String::new();
    for event in &events {
        let line = serde_json::to_string(event)
            .map_err(|err| GovernanceError::nondeterministic(err.to_string()))?;
        body.push_str(&line);
        body.push('\n');
    }
    let response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson".to_string())],
        body,
    )
        .into_response();
    Ok(response)
}

/// `GET /healthz`: process liveness.
async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /readyz`: storage reachability.
async fn readyz(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    state.registry.services().store.list_manifests()?;
    state.events.tenants()?;
    Ok(Json(json!({"status": "ready"})))
}
