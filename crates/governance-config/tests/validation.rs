//! Governance config validation tests.
// crates/governance-config/tests/validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate store, signing, server, and quota constraints.
// Purpose: Ensure deployment settings fail closed and env overrides apply.
// =============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::io::Write;

use governance_config::ConfigError;
use governance_config::GovernanceConfig;
use governance_config::StoreMode;

type TestResult = Result<(), String>;

fn minimal_config() -> GovernanceConfig {
    let mut config = GovernanceConfig::default();
    config.events.secret = "unit-test-secret".to_string();
    config.signing.key_id = "k-primary".to_string();
    config
}

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn minimal_config_validates() -> TestResult {
    minimal_config().validate().map_err(|err| err.to_string())
}

#[test]
fn missing_event_secret_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.events.secret = String::new();
    assert_invalid(config.validate(), "event secret is required")
}

#[test]
fn missing_signing_key_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.signing.key_id = "  ".to_string();
    assert_invalid(config.validate(), "signing key_id is required")
}

#[test]
fn bad_bind_address_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.server.bind = "not-an-address".to_string();
    assert_invalid(config.validate(), "not a socket address")
}

#[test]
fn zero_workers_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.jobs.workers = 0;
    assert_invalid(config.validate(), "jobs.workers")
}

#[test]
fn zero_queue_capacity_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.jobs.queue_capacity = 0;
    assert_invalid(config.validate(), "jobs.queue_capacity")
}

#[test]
fn zero_concurrency_quota_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.jobs.default_quota.max_concurrent_jobs = 0;
    assert_invalid(config.validate(), "max_concurrent_jobs")
}

#[test]
fn zero_window_tenant_quota_is_rejected() -> TestResult {
    let mut config = minimal_config();
    let mut quota = config.jobs.default_quota;
    quota.window_seconds = 0;
    config.jobs.tenant_quotas.insert("acme".to_string(), quota);
    assert_invalid(config.validate(), "jobs.tenant_quotas.acme")
}

#[test]
fn zero_sweep_interval_is_rejected() -> TestResult {
    let mut config = minimal_config();
    config.sweeper.interval_seconds = 0;
    assert_invalid(config.validate(), "sweeper.interval_seconds")
}

#[test]
fn env_overrides_replace_file_values() {
    let mut config = minimal_config();
    config.apply_overrides(|name| match name {
        "GOVERNANCE_EVENT_SECRET" => Some("env-secret".to_string()),
        "GOVERNANCE_SIGNING_KEY_ID" => Some("k-env".to_string()),
        "GOVERNANCE_STORE_ROOT" => Some("/var/lib/governance".to_string()),
        "GOVERNANCE_WORKERS" => Some("9".to_string()),
        "GOVERNANCE_MAX_CONCURRENT_JOBS_DEFAULT" => Some("17".to_string()),
        _ => None,
    });
    assert_eq!(config.events.secret, "env-secret");
    assert_eq!(config.signing.key_id, "k-env");
    assert_eq!(config.store.root, std::path::PathBuf::from("/var/lib/governance"));
    assert_eq!(config.jobs.workers, 9);
    assert_eq!(config.jobs.default_quota.max_concurrent_jobs, 17);
}

#[test]
fn malformed_env_numbers_are_ignored() {
    let mut config = minimal_config();
    let workers_before = config.jobs.workers;
    config.apply_overrides(|name| match name {
        "GOVERNANCE_WORKERS" => Some("many".to_string()),
        _ => None,
    });
    assert_eq!(config.jobs.workers, workers_before);
}

#[test]
fn toml_round_trip_loads_sections() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
[store]
mode = "memory"

[signing]
key_id = "k-file"

[jobs]
workers = 2

[jobs.job_costs]
plan-build = 5

[licensing]
forbidden_tags = ["proprietary-no-export"]
"#
    )
    .expect("write config");

    let config = GovernanceConfig::load(file.path()).expect("load");
    assert_eq!(config.store.mode, StoreMode::Memory);
    assert_eq!(config.signing.key_id, "k-file");
    assert_eq!(config.jobs.workers, 2);
    assert_eq!(config.jobs.job_costs.get("plan-build"), Some(&5));
    assert_eq!(config.licensing.forbidden_tags, vec!["proprietary-no-export".to_string()]);
}
