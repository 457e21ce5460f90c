// crates/governance-jobs/src/handler.rs
// ============================================================================
// Module: Job Handlers
// Description: Handler registry, execution context, and cancellation token.
// Purpose: Map job types to handlers and give them cooperative control points.
// Dependencies: governance-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Handlers are registered once at startup under a `job_type` key; enqueue
//! rejects unknown types with `SCHEMA_VIOLATION`. A handler receives the job
//! record and a [`JobContext`] carrying the payload, a deadline, and a
//! cancellation token. Handlers must call [`JobContext::checkpoint`] at
//! their suspension points; that is where cancellation and deadline expiry
//! are observed. Handlers must be idempotent with respect to the job's
//! idempotency key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use governance_core::Clock;
use governance_core::GovernanceError;
use governance_core::JobRecord;
use governance_core::Timestamp;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between caller and worker.
///
/// # Invariants
/// - Once canceled, the token never resets.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    /// Shared cancellation flag.
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, un-canceled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Handler Errors
// ============================================================================

/// Handler execution failures.
///
/// # Invariants
/// - `Transient` and `Timeout` are retryable; the rest are terminal.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Cancellation was observed at a checkpoint.
    #[error("job canceled at a suspension point")]
    Canceled,
    /// The handler deadline expired.
    #[error("job deadline exceeded")]
    Timeout,
    /// Transient failure worth retrying.
    #[error("transient handler failure: {0}")]
    Transient(String),
    /// Terminal failure; never retried.
    #[error("terminal handler failure: {0}")]
    Terminal(GovernanceError),
}

impl HandlerError {
    /// Returns whether the scheduler may retry the job.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Context handed to a handler invocation.
///
/// # Invariants
/// - `deadline` is absolute; checkpoints compare it against the clock.
pub struct JobContext {
    /// Submitted job payload.
    pub payload: Value,
    /// Absolute execution deadline.
    pub deadline: Timestamp,
    /// Cancellation token observed at checkpoints.
    cancel: CancellationToken,
    /// Injected time source.
    clock: Arc<dyn Clock>,
}

impl JobContext {
    /// Creates a context for one handler invocation.
    #[must_use]
    pub fn new(
        payload: Value,
        deadline: Timestamp,
        cancel: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            payload,
            deadline,
            cancel,
            clock,
        }
    }

    /// Suspension point: observes cancellation and deadline expiry.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Canceled`] when cancellation was requested and
    /// [`HandlerError::Timeout`] when the deadline has passed.
    pub fn checkpoint(&self) -> Result<(), HandlerError> {
        if self.cancel.is_canceled() {
            return Err(HandlerError::Canceled);
        }
        if self.clock.now() > self.deadline {
            return Err(HandlerError::Timeout);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Handler Trait and Outcome
// ============================================================================

/// Result of a successful handler run.
///
/// # Invariants
/// - `log_pointer` references captured handler output, when any.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    /// Pointer to the captured handler log.
    pub log_pointer: Option<String>,
}

/// Job handler invoked by worker threads.
pub trait JobHandler: Send + Sync {
    /// Runs the job to completion or to a typed failure.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] describing the failure class; the scheduler
    /// retries only transient classes.
    fn run(&self, job: &JobRecord, ctx: &JobContext) -> Result<JobOutcome, HandlerError>;
}

// ============================================================================
// SECTION: Handler Registry
// ============================================================================

/// Registry mapping `job_type` keys to handlers.
///
/// # Invariants
/// - Registration happens once at startup; later lookups are read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Handlers by job type.
    handlers: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a job type key.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Returns whether a job type is registered.
    #[must_use]
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Resolves a handler by job type.
    #[must_use]
    pub fn resolve(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).map(Arc::clone)
    }
}
