//! # Clock Sources
//!
//! The vault never reads wall-clock time on its own. Every guard that cares
//! about "now" receives it from a [`Clock`], which keeps the state machine
//! deterministic under test and lets a host plug in whatever time source it
//! trusts (block timestamps, NTP-disciplined system time, a simulation).
//!
//! All timestamps are unix seconds as `u64`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// A monotonic source of the current time, in unix seconds.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp. Successive calls never go backwards.
    fn now(&self) -> u64;
}

// ---------------------------------------------------------------------------
// SystemClock
// ---------------------------------------------------------------------------

/// Wall-clock time via `chrono`, clamped so it never runs backwards even if
/// the host clock is stepped.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicU64,
}

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // Pre-1970 readings clamp to zero.
        let observed = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let previous = self.high_water.fetch_max(observed, Ordering::AcqRel);
        previous.max(observed)
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to. Used by simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves the clock forward to `timestamp`. Earlier timestamps are
    /// ignored so the clock stays monotonic.
    pub fn set(&self, timestamp: u64) {
        self.now.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Advances the clock by `seconds`, saturating at `u64::MAX`.
    pub fn advance(&self, seconds: u64) {
        // fetch_update only fails when the closure returns None.
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(seconds))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
