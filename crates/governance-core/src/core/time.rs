// crates/governance-core/src/core/time.rs
// ============================================================================
// Module: Governance Time Model
// Description: Canonical timestamps and the injected clock abstraction.
// Purpose: Keep registry decisions deterministic and replayable under test.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The registry records time as unix epoch milliseconds. Core logic never
//! reads the wall clock directly; callers inject a [`Clock`] so expiry sweeps,
//! quota windows, and gate freshness checks are deterministic in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers or an injected [`Clock`].
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the whole days elapsed since `earlier` (zero when negative).
    #[must_use]
    pub const fn days_since(self, earlier: Self) -> i64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta <= 0 {
            0
        } else {
            delta / 86_400_000
        }
    }

    /// Renders the timestamp as an RFC 3339 string when representable.
    #[must_use]
    pub fn to_rfc3339(self) -> Option<String> {
        let seconds = self.0.div_euclid(1_000);
        let datetime = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
        datetime.format(&Rfc3339).ok()
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Injected time source for registry operations.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed [`Clock`] used by production services.
///
/// # Invariants
/// - Times before the unix epoch clamp to zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
///
/// # Invariants
/// - `now` returns the last value set or advanced to.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in unix milliseconds.
    now: Mutex<i64>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given timestamp.
    #[must_use]
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start.as_unix_millis()),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = guard.saturating_add(millis);
    }

    /// Sets the clock to an absolute timestamp.
    pub fn set(&self, now: Timestamp) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = now.as_unix_millis();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Timestamp::from_unix_millis(*guard)
    }
}
