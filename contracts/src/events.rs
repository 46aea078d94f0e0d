//! Vault notifications.
//!
//! Each successful operation produces exactly one [`VaultEvent`], wrapped in
//! an [`EventRecord`] whose `sequence` is assigned at the moment the ledger
//! transition commits. Subscribers receive records in sequence order. A
//! release that fails after its vault was cleared publishes nothing, so the
//! delivered sequence may skip a number.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time_lock_vault::AccountId;

/// Capacity of the broadcast channel feeding subscribers. Slow subscribers
/// that fall further behind than this observe a lag error.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A state change that callers may want to observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// Funds were locked.
    Deposited {
        /// Owner of the new vault.
        account: AccountId,
        /// Amount locked.
        amount: u64,
        /// When it unlocks.
        unlock_time: u64,
    },
    /// Funds were released.
    Withdrawn {
        /// Owner of the cleared vault.
        account: AccountId,
        /// Amount released.
        amount: u64,
    },
    /// An unlock time was pushed out.
    VaultExtended {
        /// Owner of the vault.
        account: AccountId,
        /// The new unlock time.
        new_unlock_time: u64,
    },
}

impl VaultEvent {
    /// The account the event concerns.
    pub fn account(&self) -> &AccountId {
        match self {
            VaultEvent::Deposited { account, .. }
            | VaultEvent::Withdrawn { account, .. }
            | VaultEvent::VaultExtended { account, .. } => account,
        }
    }
}

impl fmt::Display for VaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultEvent::Deposited { .. } => write!(f, "Deposited"),
            VaultEvent::Withdrawn { .. } => write!(f, "Withdrawn"),
            VaultEvent::VaultExtended { .. } => write!(f, "VaultExtended"),
        }
    }
}

/// A [`VaultEvent`] stamped with its commit order and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the ledger's commit order, starting at zero.
    pub sequence: u64,
    /// Clock reading at commit.
    pub timestamp: u64,
    /// What happened.
    pub event: VaultEvent,
}
