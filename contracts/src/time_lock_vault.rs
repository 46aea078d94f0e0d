//! # Time-Lock Vault Contract
//!
//! A single-asset custody ledger where every account may park at most one
//! deposit behind an unlock time of its own choosing. The lifecycle is:
//!
//! 1. **Deposit** — the account locks an amount for a duration inside the
//!    policy window. The unlock time is `now + duration`.
//! 2. **Extend** — while locked, the account may push the unlock time
//!    further out, never beyond `now + max_lock_duration`.
//! 3. **Withdraw** — once `now >= unlock_time`, the record is cleared and
//!    the full amount is handed back for release.
//!
//! The ledger here is the pure state machine: it takes `now` as an argument,
//! never moves value itself, and reports what a successful transition means
//! for the outside world ([`Release`], the committed [`CustodyRecord`]). The
//! [`crate::service::VaultService`] drives the clock and the value transfers.
//!
//! Every guard runs before the first write, so a rejected call leaves the
//! ledger exactly as it found it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PolicyError, VaultPolicy};
use crate::transfer::TransferError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a lock duration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationRejection {
    /// The deposit duration falls outside the policy window.
    OutOfRange {
        /// Requested duration, in seconds.
        duration: u64,
        /// Policy minimum.
        min: u64,
        /// Policy maximum.
        max: u64,
    },
    /// An extension of zero seconds.
    ZeroExtension,
    /// The extension would push the unlock time past `now + max`.
    BeyondHorizon {
        /// Unlock time the extension would produce.
        requested_unlock: u64,
        /// Latest unlock time the policy allows right now.
        horizon: u64,
    },
}

impl fmt::Display for DurationRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationRejection::OutOfRange { duration, min, max } => {
                write!(f, "lock duration {duration}s outside [{min}s, {max}s]")
            }
            DurationRejection::ZeroExtension => write!(f, "extension must be positive"),
            DurationRejection::BeyondHorizon {
                requested_unlock,
                horizon,
            } => write!(
                f,
                "unlock time {requested_unlock} would exceed horizon {horizon}"
            ),
        }
    }
}

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A deposit carried no value.
    #[error("invalid amount: deposits must carry a positive value")]
    InvalidAmount,

    /// A deposit or extension duration violated the lock policy.
    #[error("invalid duration: {0}")]
    InvalidDuration(DurationRejection),

    /// The account already has funds locked.
    #[error("vault already exists for {account} (unlocks at {unlock_time})")]
    VaultAlreadyExists {
        /// The depositing account.
        account: AccountId,
        /// Unlock time of the existing vault.
        unlock_time: u64,
    },

    /// The account has nothing locked.
    #[error("no active vault for {account}")]
    NoActiveVault {
        /// The calling account.
        account: AccountId,
    },

    /// Withdrawal attempted before the unlock time.
    #[error("vault for {account} is locked until {unlock_time} (now {now})")]
    VaultStillLocked {
        /// The calling account.
        account: AccountId,
        /// When the vault unlocks.
        unlock_time: u64,
        /// The time of the attempt.
        now: u64,
    },

    /// The value transfer backing the operation did not go through.
    ///
    /// On withdraw the record has already been cleared when this is
    /// returned; the amount is no longer held by the ledger and must be
    /// reconciled out of band.
    #[error("transfer of {amount} for {account} failed: {source}")]
    TransferFailed {
        /// The account on the other side of the transfer.
        account: AccountId,
        /// Amount that was being moved.
        amount: u64,
        /// What the transfer primitive reported.
        #[source]
        source: TransferError,
    },

    /// A timestamp or balance sum would overflow `u64`.
    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(&'static str),

    /// A stored snapshot violates the record invariants or cannot be parsed.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The ledger could not be written out as a snapshot.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),

    /// The ledger was handed an invalid policy.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of an account that can own a vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps an account identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The per-account custody entry.
///
/// An inactive record is always all zeroes; that is also what the ledger
/// reports for accounts it has never seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    /// Locked amount in smallest units.
    pub amount: u64,
    /// Unix timestamp before which withdrawal is refused.
    pub unlock_time: u64,
    /// Whether funds are currently held.
    pub active: bool,
}

impl CustodyRecord {
    /// Builds an active record.
    fn locked(amount: u64, unlock_time: u64) -> Self {
        Self {
            amount,
            unlock_time,
            active: true,
        }
    }

    /// Checks the record invariants: inactive means zeroed, active means a
    /// positive amount.
    pub fn is_well_formed(&self) -> bool {
        if self.active {
            self.amount > 0
        } else {
            self.amount == 0 && self.unlock_time == 0
        }
    }
}

/// Read-only view of an account's vault at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultInfo {
    /// Locked amount (zero when inactive).
    pub amount: u64,
    /// Unlock timestamp (zero when inactive).
    pub unlock_time: u64,
    /// Whether funds are currently held.
    pub active: bool,
    /// Seconds until unlock; zero once unlocked or when inactive.
    pub time_remaining: u64,
}

/// Result of a successful withdraw transition: the amount the caller must
/// now release to `account`. The record is already cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a cleared vault's funds must be released"]
pub struct Release {
    /// Recipient of the released value.
    pub account: AccountId,
    /// Amount to release.
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// VaultLedger
// ---------------------------------------------------------------------------

/// The account → record mapping and the transitions over it.
///
/// Only active records are stored; withdrawal removes the entry, which reads
/// back as the zeroed [`CustodyRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultLedger {
    /// Lock-duration bounds.
    policy: VaultPolicy,
    /// Active records keyed by owner.
    records: HashMap<AccountId, CustodyRecord>,
    /// Sum of all active amounts.
    total_custodied: u64,
}

impl VaultLedger {
    /// Creates an empty ledger governed by `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Policy`] if the policy window is invalid.
    pub fn new(policy: VaultPolicy) -> Result<Self, VaultError> {
        policy.validate()?;
        Ok(Self {
            policy,
            records: HashMap::new(),
            total_custodied: 0,
        })
    }

    /// The policy in force.
    pub fn policy(&self) -> &VaultPolicy {
        &self.policy
    }

    /// Returns the account's record, zeroed if it holds nothing.
    pub fn record(&self, account: &AccountId) -> CustodyRecord {
        self.records.get(account).copied().unwrap_or_default()
    }

    /// Validates a deposit without touching state and returns the record it
    /// would create.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidAmount`] if `amount` is zero.
    /// - [`VaultError::InvalidDuration`] if `duration` is outside the policy window.
    /// - [`VaultError::VaultAlreadyExists`] if the account already holds funds.
    /// - [`VaultError::ArithmeticOverflow`] if the unlock time or the aggregate
    ///   balance would overflow.
    pub fn check_deposit(
        &self,
        account: &AccountId,
        amount: u64,
        duration: u64,
        now: u64,
    ) -> Result<CustodyRecord, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        if !self.policy.accepts_duration(duration) {
            return Err(VaultError::InvalidDuration(DurationRejection::OutOfRange {
                duration,
                min: self.policy.min_lock_duration,
                max: self.policy.max_lock_duration,
            }));
        }

        if let Some(existing) = self.records.get(account) {
            return Err(VaultError::VaultAlreadyExists {
                account: account.clone(),
                unlock_time: existing.unlock_time,
            });
        }

        let unlock_time = now
            .checked_add(duration)
            .ok_or(VaultError::ArithmeticOverflow("unlock time"))?;

        self.total_custodied
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow("custodied balance"))?;

        Ok(CustodyRecord::locked(amount, unlock_time))
    }

    /// Opens a vault for `account`, locking `amount` until `now + duration`.
    ///
    /// `amount` is the value that accompanies the call; the caller is
    /// responsible for having moved it into custody.
    ///
    /// # Errors
    ///
    /// Same as [`check_deposit`](Self::check_deposit).
    pub fn deposit(
        &mut self,
        account: &AccountId,
        amount: u64,
        duration: u64,
        now: u64,
    ) -> Result<CustodyRecord, VaultError> {
        let record = self.check_deposit(account, amount, duration, now)?;

        self.total_custodied = self
            .total_custodied
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow("custodied balance"))?;
        self.records.insert(account.clone(), record);

        Ok(record)
    }

    /// Pushes the account's unlock time out by `additional` seconds and
    /// returns the new unlock time.
    ///
    /// The result may not exceed `now + max_lock_duration`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoActiveVault`] if the account holds nothing.
    /// - [`VaultError::InvalidDuration`] if `additional` is zero or the new
    ///   unlock time would pass the horizon.
    /// - [`VaultError::ArithmeticOverflow`] if the timestamps overflow.
    pub fn extend(
        &mut self,
        account: &AccountId,
        additional: u64,
        now: u64,
    ) -> Result<u64, VaultError> {
        let max_lock = self.policy.max_lock_duration;
        let record = self
            .records
            .get_mut(account)
            .ok_or_else(|| VaultError::NoActiveVault {
                account: account.clone(),
            })?;

        if additional == 0 {
            return Err(VaultError::InvalidDuration(DurationRejection::ZeroExtension));
        }

        let requested_unlock = record
            .unlock_time
            .checked_add(additional)
            .ok_or(VaultError::ArithmeticOverflow("unlock time"))?;
        let horizon = now
            .checked_add(max_lock)
            .ok_or(VaultError::ArithmeticOverflow("lock horizon"))?;

        if requested_unlock > horizon {
            return Err(VaultError::InvalidDuration(
                DurationRejection::BeyondHorizon {
                    requested_unlock,
                    horizon,
                },
            ));
        }

        record.unlock_time = requested_unlock;
        Ok(requested_unlock)
    }

    /// Clears the account's vault once it has unlocked and returns what must
    /// be released.
    ///
    /// The record is gone by the time this returns. Anything observing the
    /// ledger while the release is in flight sees no vault.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoActiveVault`] if the account holds nothing.
    /// - [`VaultError::VaultStillLocked`] if `now < unlock_time`.
    pub fn withdraw(&mut self, account: &AccountId, now: u64) -> Result<Release, VaultError> {
        let record = self
            .records
            .get(account)
            .ok_or_else(|| VaultError::NoActiveVault {
                account: account.clone(),
            })?;

        if now < record.unlock_time {
            return Err(VaultError::VaultStillLocked {
                account: account.clone(),
                unlock_time: record.unlock_time,
                now,
            });
        }

        let remaining = self
            .total_custodied
            .checked_sub(record.amount)
            .ok_or(VaultError::ArithmeticOverflow("custodied balance"))?;

        let amount = record.amount;
        self.records.remove(account);
        self.total_custodied = remaining;

        Ok(Release {
            account: account.clone(),
            amount,
        })
    }

    /// Reports the account's vault as of `now`.
    pub fn vault_info(&self, account: &AccountId, now: u64) -> VaultInfo {
        let record = self.record(account);
        let time_remaining = if record.active {
            record.unlock_time.saturating_sub(now)
        } else {
            0
        };
        VaultInfo {
            amount: record.amount,
            unlock_time: record.unlock_time,
            active: record.active,
            time_remaining,
        }
    }

    /// Returns `true` if the account holds funds that have unlocked.
    pub fn can_withdraw(&self, account: &AccountId, now: u64) -> bool {
        self.records
            .get(account)
            .is_some_and(|record| now >= record.unlock_time)
    }

    /// Total value currently held across all vaults.
    pub fn contract_balance(&self) -> u64 {
        self.total_custodied
    }

    /// Number of accounts with funds locked.
    pub fn active_vaults(&self) -> usize {
        self.records.len()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serializes the ledger to JSON.
    pub fn to_snapshot(&self) -> Result<String, VaultError> {
        serde_json::to_string(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    /// Restores a ledger from a JSON snapshot, rejecting anything that
    /// violates the record invariants or whose stored total disagrees with
    /// the records.
    pub fn from_snapshot(snapshot: &str) -> Result<Self, VaultError> {
        let ledger: Self =
            serde_json::from_str(snapshot).map_err(|e| VaultError::CorruptSnapshot(e.to_string()))?;
        ledger.policy.validate()?;
        ledger.audit()?;
        Ok(ledger)
    }

    /// Verifies every stored record is active and well formed and that the
    /// aggregate balance equals the sum of amounts.
    pub fn audit(&self) -> Result<(), VaultError> {
        let mut sum: u64 = 0;
        for (account, record) in &self.records {
            if !record.active || !record.is_well_formed() {
                return Err(VaultError::CorruptSnapshot(format!(
                    "malformed record for {account}: {record:?}"
                )));
            }
            sum = sum
                .checked_add(record.amount)
                .ok_or(VaultError::ArithmeticOverflow("custodied balance"))?;
        }

        if sum != self.total_custodied {
            return Err(VaultError::CorruptSnapshot(format!(
                "total {} does not match record sum {sum}",
                self.total_custodied
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_LOCK_DURATION, MIN_LOCK_DURATION};

    fn alice() -> AccountId {
        AccountId::from("alice")
    }

    fn ledger() -> VaultLedger {
        VaultLedger::new(VaultPolicy::default()).unwrap()
    }

    #[test]
    fn deposit_creates_locked_record() {
        let mut ledger = ledger();
        let record = ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        assert_eq!(record, CustodyRecord::locked(1_000, 3_600));
        assert_eq!(ledger.record(&alice()), record);
        assert_eq!(ledger.contract_balance(), 1_000);
    }

    #[test]
    fn zero_amount_rejected() {
        let mut ledger = ledger();
        let result = ledger.deposit(&alice(), 0, 3_600, 0);
        assert!(matches!(result, Err(VaultError::InvalidAmount)));
        assert_eq!(ledger.record(&alice()), CustodyRecord::default());
    }

    #[test]
    fn duration_bounds_are_inclusive() {
        let mut ledger = ledger();
        assert!(ledger
            .deposit(&"a".into(), 1, MIN_LOCK_DURATION, 0)
            .is_ok());
        assert!(ledger
            .deposit(&"b".into(), 1, MAX_LOCK_DURATION, 0)
            .is_ok());
        assert!(matches!(
            ledger.deposit(&"c".into(), 1, MIN_LOCK_DURATION - 1, 0),
            Err(VaultError::InvalidDuration(DurationRejection::OutOfRange { .. }))
        ));
        assert!(matches!(
            ledger.deposit(&"d".into(), 1, MAX_LOCK_DURATION + 1, 0),
            Err(VaultError::InvalidDuration(DurationRejection::OutOfRange { .. }))
        ));
    }

    #[test]
    fn unlock_time_overflow_rejected() {
        let mut ledger = ledger();
        let result = ledger.deposit(&alice(), 1, 60, u64::MAX - 10);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow(_))));
        assert_eq!(ledger.active_vaults(), 0);
    }

    #[test]
    fn aggregate_overflow_rejected() {
        let mut ledger = ledger();
        ledger.deposit(&"whale".into(), u64::MAX, 60, 0).unwrap();
        let result = ledger.deposit(&alice(), 1, 60, 0);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow(_))));
        assert_eq!(ledger.record(&alice()), CustodyRecord::default());
        assert_eq!(ledger.contract_balance(), u64::MAX);
    }

    #[test]
    fn check_deposit_does_not_mutate() {
        let ledger = ledger();
        let record = ledger.check_deposit(&alice(), 500, 600, 10).unwrap();
        assert_eq!(record.unlock_time, 610);
        assert_eq!(ledger.active_vaults(), 0);
        assert_eq!(ledger.contract_balance(), 0);
    }

    #[test]
    fn extend_adds_exact_duration() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        let unlock = ledger.extend(&alice(), 600, 100).unwrap();
        assert_eq!(unlock, 4_200);
        assert_eq!(ledger.record(&alice()).unlock_time, 4_200);
    }

    #[test]
    fn extend_capped_relative_to_now() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, MAX_LOCK_DURATION, 0).unwrap();

        // Already at the horizon: one more second is too much.
        let result = ledger.extend(&alice(), 1, 0);
        assert!(matches!(
            result,
            Err(VaultError::InvalidDuration(DurationRejection::BeyondHorizon { .. }))
        ));
        assert_eq!(ledger.record(&alice()).unlock_time, MAX_LOCK_DURATION);

        // Time passes, the horizon moves with it.
        let unlock = ledger.extend(&alice(), 100, 100).unwrap();
        assert_eq!(unlock, MAX_LOCK_DURATION + 100);
    }

    #[test]
    fn extend_zero_rejected() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        assert!(matches!(
            ledger.extend(&alice(), 0, 0),
            Err(VaultError::InvalidDuration(DurationRejection::ZeroExtension))
        ));
    }

    #[test]
    fn extend_without_vault_rejected() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.extend(&alice(), 60, 0),
            Err(VaultError::NoActiveVault { .. })
        ));
    }

    #[test]
    fn withdraw_clears_record() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        let release = ledger.withdraw(&alice(), 3_600).unwrap();
        assert_eq!(release.amount, 1_000);
        assert_eq!(release.account, alice());
        assert_eq!(ledger.record(&alice()), CustodyRecord::default());
        assert_eq!(ledger.contract_balance(), 0);
    }

    #[test]
    fn early_withdraw_rejected() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        assert!(matches!(
            ledger.withdraw(&alice(), 3_599),
            Err(VaultError::VaultStillLocked {
                unlock_time: 3_600,
                now: 3_599,
                ..
            })
        ));
        assert_eq!(ledger.record(&alice()), CustodyRecord::locked(1_000, 3_600));
    }

    #[test]
    fn vault_info_reports_remaining_time() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();

        let info = ledger.vault_info(&alice(), 600);
        assert_eq!(info.time_remaining, 3_000);
        assert!(info.active);

        assert_eq!(ledger.vault_info(&alice(), 9_999).time_remaining, 0);
        assert_eq!(ledger.vault_info(&"nobody".into(), 0), VaultInfo::default());
    }

    #[test]
    fn records_are_well_formed() {
        assert!(CustodyRecord::default().is_well_formed());
        assert!(CustodyRecord::locked(1, 0).is_well_formed());
        assert!(!CustodyRecord::locked(0, 10).is_well_formed());
        let stale = CustodyRecord {
            amount: 5,
            unlock_time: 0,
            active: false,
        };
        assert!(!stale.is_well_formed());
    }

    #[test]
    fn invalid_policy_rejected_at_construction() {
        let policy = VaultPolicy {
            min_lock_duration: 10,
            max_lock_duration: 5,
        };
        assert!(matches!(VaultLedger::new(policy), Err(VaultError::Policy(_))));
    }

    #[test]
    fn snapshot_write_and_read_errors_are_distinct() {
        let mut ledger = ledger();
        ledger.deposit(&alice(), 1_000, 3_600, 0).unwrap();
        let snapshot = ledger.to_snapshot().unwrap();
        assert!(VaultLedger::from_snapshot(&snapshot).is_ok());

        let truncated = &snapshot[..snapshot.len() / 2];
        assert!(matches!(
            VaultLedger::from_snapshot(truncated),
            Err(VaultError::CorruptSnapshot(_))
        ));

        let write_error = VaultError::Serialization("io".into());
        assert_eq!(write_error.to_string(), "snapshot serialization failed: io");
    }
}
