// crates/governance-config/src/lib.rs
// ============================================================================
// Module: Governance Configuration
// Description: Typed configuration with TOML loading and env overrides.
// Purpose: Validate every deployment knob fail-closed before startup.
// Dependencies: governance-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file, then overridden by
//! `GOVERNANCE_*` environment variables, then validated. Validation fails
//! closed: an empty event secret, zero workers, or an unparseable bind
//! address rejects startup rather than degrading at runtime. The event
//! secret is the only process-global secret and is never serialized back
//! out.
//!
//! Security posture: configuration files are untrusted input; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use governance_core::QuotaLimits;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Messages never embed the event secret.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration is semantically invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Store backend selection.
///
/// # Invariants
/// - Wire form is the lowercase mode label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Volatile in-memory stores (tests and experiments).
    Memory,
    /// Durable filesystem stores under `root`.
    #[default]
    Filesystem,
}

/// Artifact, event, and job persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend mode.
    #[serde(default)]
    pub mode: StoreMode,
    /// Store root directory for filesystem mode.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::default(),
            root: default_store_root(),
        }
    }
}

/// Returns the default store root.
fn default_store_root() -> PathBuf {
    PathBuf::from("./governance-data")
}

/// Event journal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Shared HMAC secret for the event chain (env: `GOVERNANCE_EVENT_SECRET`).
    #[serde(default, skip_serializing)]
    pub secret: String,
}

/// Manifest signing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Key identifier recorded in manifests.
    #[serde(default)]
    pub key_id: String,
    /// Base64-encoded 32-byte Ed25519 seed (absent means verify-only).
    #[serde(default, skip_serializing)]
    pub seed_base64: Option<String>,
    /// Additional verification-only public keys by key identifier.
    #[serde(default)]
    pub verifying_keys: BTreeMap<String, String>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Returns the default loopback bind address.
fn default_bind() -> String {
    "127.0.0.1:7710".to_string()
}

/// Per-tenant quota limits as configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaLimitsConfig {
    /// Maximum jobs counting against concurrency.
    pub max_concurrent_jobs: u32,
    /// Maximum jobs enqueued within the sliding window.
    pub max_jobs_per_window: u32,
    /// Sliding window length in seconds.
    pub window_seconds: u32,
    /// Total cost budget in abstract units.
    pub cost_budget_units: u64,
}

impl Default for QuotaLimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_jobs_per_window: 120,
            window_seconds: 60,
            cost_budget_units: 10_000,
        }
    }
}

impl From<QuotaLimitsConfig> for QuotaLimits {
    fn from(config: QuotaLimitsConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs,
            max_jobs_per_window: config.max_jobs_per_window,
            window_seconds: config.window_seconds,
            cost_budget_units: config.cost_budget_units,
        }
    }
}

/// Job service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker thread count (env: `GOVERNANCE_WORKERS`).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded per-tenant queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Default retry budget for new jobs.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Handler deadline in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: i64,
    /// Exponential backoff base in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Exponential backoff cap in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Cost units for job types without an explicit entry.
    #[serde(default = "default_job_cost")]
    pub default_job_cost: u64,
    /// Cost units per job type.
    #[serde(default)]
    pub job_costs: BTreeMap<String, u64>,
    /// Default quota limits (env override: `GOVERNANCE_MAX_CONCURRENT_JOBS_DEFAULT`).
    #[serde(default)]
    pub default_quota: QuotaLimitsConfig,
    /// Per-tenant quota overrides.
    #[serde(default)]
    pub tenant_quotas: BTreeMap<String, QuotaLimitsConfig>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            default_max_retries: default_max_retries(),
            default_deadline_ms: default_deadline_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            default_job_cost: default_job_cost(),
            job_costs: BTreeMap::new(),
            default_quota: QuotaLimitsConfig::default(),
            tenant_quotas: BTreeMap::new(),
        }
    }
}

/// Returns the default worker count.
const fn default_workers() -> usize {
    4
}

/// Returns the default queue capacity.
const fn default_queue_capacity() -> usize {
    256
}

/// Returns the default retry budget.
const fn default_max_retries() -> u32 {
    3
}

/// Returns the default handler deadline.
const fn default_deadline_ms() -> i64 {
    300_000
}

/// Returns the default backoff base.
const fn default_backoff_base_ms() -> u64 {
    500
}

/// Returns the default backoff cap.
const fn default_backoff_cap_ms() -> u64 {
    60_000
}

/// Returns the default job cost.
const fn default_job_cost() -> u64 {
    1
}

/// Background sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Waiver sweep interval in seconds (daily by default).
    #[serde(default = "default_sweep_interval_seconds")]
    pub interval_seconds: u64,
    /// Job log compaction interval in seconds (hourly by default).
    #[serde(default = "default_compaction_interval_seconds")]
    pub compaction_interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval_seconds(),
            compaction_interval_seconds: default_compaction_interval_seconds(),
        }
    }
}

/// Returns the default waiver sweep interval (one day).
const fn default_sweep_interval_seconds() -> u64 {
    86_400
}

/// Returns the default compaction interval (one hour).
const fn default_compaction_interval_seconds() -> u64 {
    3_600
}

/// Licensing policy knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicensingConfig {
    /// License tags that block publication outright.
    #[serde(default)]
    pub forbidden_tags: Vec<String>,
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root governance registry configuration.
///
/// # Invariants
/// - `validate` passes before any service is constructed from this value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Persistence configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Event journal configuration.
    #[serde(default)]
    pub events: EventLogConfig,
    /// Manifest signing configuration.
    #[serde(default)]
    pub signing: SigningConfig,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Job service configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Background sweeper configuration.
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Licensing policy knobs.
    #[serde(default)]
    pub licensing: LicensingConfig,
}

impl GovernanceConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies `GOVERNANCE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary lookup (testable seam).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("GOVERNANCE_EVENT_SECRET") {
            self.events.secret = secret;
        }
        if let Some(key_id) = lookup("GOVERNANCE_SIGNING_KEY_ID") {
            self.signing.key_id = key_id;
        }
        if let Some(seed) = lookup("GOVERNANCE_SIGNING_KEY_SEED") {
            self.signing.seed_base64 = Some(seed);
        }
        if let Some(root) = lookup("GOVERNANCE_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(workers) = lookup("GOVERNANCE_WORKERS")
            && let Ok(workers) = workers.parse::<usize>()
        {
            self.jobs.workers = workers;
        }
        if let Some(limit) = lookup("GOVERNANCE_MAX_CONCURRENT_JOBS_DEFAULT")
            && let Ok(limit) = limit.parse::<u32>()
        {
            self.jobs.default_quota.max_concurrent_jobs = limit;
        }
    }

    /// Validates the configuration, failing closed on any bad knob.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "event secret is required (GOVERNANCE_EVENT_SECRET)".to_string(),
            ));
        }
        if self.signing.key_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "signing key_id is required (GOVERNANCE_SIGNING_KEY_ID)".to_string(),
            ));
        }
        if self.store.mode == StoreMode::Filesystem
            && self.store.root.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "filesystem store requires a root directory".to_string(),
            ));
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server bind address {} is not a socket address",
                self.server.bind
            )));
        }
        if self.jobs.workers == 0 {
            return Err(ConfigError::Invalid("jobs.workers must be greater than zero".to_string()));
        }
        if self.jobs.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "jobs.queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.jobs.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "jobs.backoff_base_ms must be greater than zero".to_string(),
            ));
        }
        if self.jobs.default_deadline_ms <= 0 {
            return Err(ConfigError::Invalid(
                "jobs.default_deadline_ms must be greater than zero".to_string(),
            ));
        }
        validate_quota("jobs.default_quota", self.jobs.default_quota)?;
        for (tenant, quota) in &self.jobs.tenant_quotas {
            validate_quota(&format!("jobs.tenant_quotas.{tenant}"), *quota)?;
        }
        if self.sweeper.interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validates one quota limits block.
fn validate_quota(label: &str, quota: QuotaLimitsConfig) -> Result<(), ConfigError> {
    if quota.max_concurrent_jobs == 0 {
        return Err(ConfigError::Invalid(format!(
            "{label}.max_concurrent_jobs must be greater than zero"
        )));
    }
    if quota.window_seconds == 0 {
        return Err(ConfigError::Invalid(format!(
            "{label}.window_seconds must be greater than zero"
        )));
    }
    Ok(())
}
