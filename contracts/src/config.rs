//! # Vault Policy & Constants
//!
//! Every lock-duration bound the vault enforces lives here. The defaults are
//! the protocol constants; deployments that need a different window load a
//! [`VaultPolicy`] from JSON and hand it to the ledger at construction time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Shortest lock a deposit may request, in seconds. One minute.
pub const MIN_LOCK_DURATION: u64 = 60;

/// Longest lock a deposit may request, in seconds. 365 days.
///
/// Also bounds extensions: an unlock time may never sit further than this
/// from the moment of the extension.
pub const MAX_LOCK_DURATION: u64 = 31_536_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`VaultPolicy`].
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The minimum lock duration must be at least one second.
    #[error("minimum lock duration must be positive")]
    ZeroMinimum,

    /// The bounds are inverted.
    #[error("invalid lock window: minimum {min} exceeds maximum {max}")]
    InvertedBounds {
        /// Configured minimum, in seconds.
        min: u64,
        /// Configured maximum, in seconds.
        max: u64,
    },

    /// The policy document could not be parsed.
    #[error("malformed policy document: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// VaultPolicy
// ---------------------------------------------------------------------------

/// Lock-duration bounds applied to deposits and extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultPolicy {
    /// Inclusive lower bound on a deposit's lock duration, in seconds.
    pub min_lock_duration: u64,
    /// Inclusive upper bound on a deposit's lock duration, and the horizon
    /// cap for extensions, in seconds.
    pub max_lock_duration: u64,
}

impl Default for VaultPolicy {
    fn default() -> Self {
        Self {
            min_lock_duration: MIN_LOCK_DURATION,
            max_lock_duration: MAX_LOCK_DURATION,
        }
    }
}

impl VaultPolicy {
    /// Builds a policy from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the bounds do not form a valid window.
    pub fn new(min_lock_duration: u64, max_lock_duration: u64) -> Result<Self, PolicyError> {
        let policy = Self {
            min_lock_duration,
            max_lock_duration,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Parses and validates a JSON policy document. Missing fields fall back
    /// to the protocol constants.
    ///
    /// ```text
    /// { "min_lock_duration": 60, "max_lock_duration": 86400 }
    /// ```
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(document)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Checks that `1 <= min <= max`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_lock_duration == 0 {
            return Err(PolicyError::ZeroMinimum);
        }
        if self.min_lock_duration > self.max_lock_duration {
            return Err(PolicyError::InvertedBounds {
                min: self.min_lock_duration,
                max: self.max_lock_duration,
            });
        }
        Ok(())
    }

    /// Returns `true` if `duration` lies inside the inclusive lock window.
    pub fn accepts_duration(&self, duration: u64) -> bool {
        (self.min_lock_duration..=self.max_lock_duration).contains(&duration)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
