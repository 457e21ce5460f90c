// crates/governance-service/src/sweeper.rs
// ============================================================================
// Module: Background Sweeper
// Description: Periodic waiver expiry sweeps and job log compaction.
// Purpose: Expire waivers daily and compact job logs hourly.
// Dependencies: governance-core, tokio
// ============================================================================

//! ## Overview
//! Two timers run for the lifetime of the service: the waiver sweeper
//! expires due waivers (and emits the seven-day advisory once per waiver),
//! and the compactor rewrites job logs down to the latest snapshot per job.
//! Both are best-effort; failures surface through telemetry and the next
//! tick retries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use governance_core::ActorId;

use crate::server::AppState;

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Actor recorded on sweeper-emitted events.
const SWEEPER_ACTOR: &str = "governance-sweeper";

/// Spawns the waiver sweeper and job log compactor onto the runtime.
pub fn spawn(state: AppState) {
    let sweep_interval = Duration::from_secs(state.sweeper.interval_seconds.max(1));
    let compact_interval = Duration::from_secs(state.sweeper.compaction_interval_seconds.max(1));

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let actor = ActorId::new(SWEEPER_ACTOR);
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let registry = std::sync::Arc::clone(&sweep_state.registry);
            let sweep_actor = actor.clone();
            // Failures surface through registry telemetry; the next tick retries.
            let _sweep =
                tokio::task::spawn_blocking(move || registry.sweep_waivers(&sweep_actor)).await;
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(compact_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let job_log = std::sync::Arc::clone(&state.job_log);
            // Compaction is best effort and retried on the next tick.
            let _compact = tokio::task::spawn_blocking(move || job_log.compact()).await;
        }
    });
}
