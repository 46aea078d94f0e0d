//! # Value Transfer
//!
//! The vault keeps the books; something else moves the money. A
//! [`ValueTransfer`] pulls a deposit into the vault's custody and pushes a
//! withdrawal back out. Either leg may fail, and the vault decides what a
//! failure means for its own state.
//!
//! [`InMemoryBank`] is the reference implementation: per-account balances in
//! a `DashMap` plus a single custody pot. It is what the simulations and
//! integration tests run against.

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::time_lock_vault::AccountId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by a value-transfer primitive.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The paying account cannot cover the amount.
    #[error("insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The paying account.
        account: AccountId,
        /// Its current balance.
        available: u64,
        /// The amount requested.
        requested: u64,
    },

    /// Custody holds less than it is asked to pay out.
    #[error("custody shortfall: holds {available}, asked to release {requested}")]
    CustodyShortfall {
        /// Value held in custody.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Crediting the receiving side would overflow `u64`.
    #[error("balance overflow crediting {account}")]
    Overflow {
        /// The account being credited (or the payer, for custody overflow).
        account: AccountId,
    },

    /// The counterparty refused the transfer.
    #[error("transfer to {account} rejected: {reason}")]
    Rejected {
        /// The refusing account.
        account: AccountId,
        /// Why it refused.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Moves native value into and out of the vault's custody.
pub trait ValueTransfer: Send + Sync {
    /// Moves `amount` from `from` into custody.
    ///
    /// Runs while the vault's ledger lock is held; implementations must not
    /// call back into the vault.
    fn collect(&self, from: &AccountId, amount: u64) -> Result<(), TransferError>;

    /// Moves `amount` out of custody to `to`.
    ///
    /// Runs with no vault lock held. The vault record has already been
    /// cleared, so a callback into the vault sees no funds.
    fn release(&self, to: &AccountId, amount: u64) -> Result<(), TransferError>;
}

// ---------------------------------------------------------------------------
// InMemoryBank
// ---------------------------------------------------------------------------

/// Account balances and a custody pot, all in memory.
#[derive(Debug, Default)]
pub struct InMemoryBank {
    /// Spendable balance per account.
    balances: DashMap<AccountId, u64>,
    /// Value currently held on behalf of the vault.
    custody: Mutex<u64>,
    /// Accounts that refuse incoming releases, with the reason given.
    refusals: DashMap<AccountId, String>,
}

impl InMemoryBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to `account` out of thin air. Setup helper.
    pub fn mint(&self, account: &AccountId, amount: u64) -> Result<u64, TransferError> {
        let mut balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow {
                account: account.clone(),
            })?;
        Ok(*balance)
    }

    /// Current spendable balance of `account`.
    pub fn balance_of(&self, account: &AccountId) -> u64 {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    /// Value currently in custody.
    pub fn custody_balance(&self) -> u64 {
        *self.custody.lock()
    }

    /// Makes `account` reject every future release.
    pub fn refuse_releases(&self, account: &AccountId, reason: impl Into<String>) {
        self.refusals.insert(account.clone(), reason.into());
    }

    /// Lifts a refusal set by [`refuse_releases`](Self::refuse_releases).
    pub fn accept_releases(&self, account: &AccountId) {
        self.refusals.remove(account);
    }
}

impl ValueTransfer for InMemoryBank {
    fn collect(&self, from: &AccountId, amount: u64) -> Result<(), TransferError> {
        let mut custody = self.custody.lock();
        let new_custody = custody
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow {
                account: from.clone(),
            })?;

        let mut balance = self
            .balances
            .get_mut(from)
            .ok_or_else(|| TransferError::InsufficientFunds {
                account: from.clone(),
                available: 0,
                requested: amount,
            })?;

        if *balance < amount {
            return Err(TransferError::InsufficientFunds {
                account: from.clone(),
                available: *balance,
                requested: amount,
            });
        }

        *balance -= amount;
        *custody = new_custody;
        Ok(())
    }

    fn release(&self, to: &AccountId, amount: u64) -> Result<(), TransferError> {
        if let Some(reason) = self.refusals.get(to) {
            return Err(TransferError::Rejected {
                account: to.clone(),
                reason: reason.value().clone(),
            });
        }

        let mut custody = self.custody.lock();
        let remaining = custody
            .checked_sub(amount)
            .ok_or(TransferError::CustodyShortfall {
                available: *custody,
                requested: amount,
            })?;

        let mut balance = self.balances.entry(to.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow {
                account: to.clone(),
            })?;

        *custody = remaining;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_moves_into_custody() {
        let bank = InMemoryBank::new();
        let alice = AccountId::from("alice");
        bank.mint(&alice, 1_000).unwrap();

        bank.collect(&alice, 400).unwrap();
        assert_eq!(bank.balance_of(&alice), 600);
        assert_eq!(bank.custody_balance(), 400);
    }

    #[test]
    fn collect_more_than_balance_fails() {
        let bank = InMemoryBank::new();
        let alice = AccountId::from("alice");
        bank.mint(&alice, 100).unwrap();

        let result = bank.collect(&alice, 101);
        assert!(matches!(
            result,
            Err(TransferError::InsufficientFunds {
                available: 100,
                requested: 101,
                ..
            })
        ));
        assert_eq!(bank.balance_of(&alice), 100);
        assert_eq!(bank.custody_balance(), 0);
    }

    #[test]
    fn collect_from_unknown_account_fails() {
        let bank = InMemoryBank::new();
        assert!(bank.collect(&"ghost".into(), 1).is_err());
    }

    #[test]
    fn release_pays_out_of_custody() {
        let bank = InMemoryBank::new();
        let alice = AccountId::from("alice");
        bank.mint(&alice, 500).unwrap();
        bank.collect(&alice, 500).unwrap();

        bank.release(&alice, 500).unwrap();
        assert_eq!(bank.balance_of(&alice), 500);
        assert_eq!(bank.custody_balance(), 0);
    }

    #[test]
    fn release_beyond_custody_fails() {
        let bank = InMemoryBank::new();
        assert!(matches!(
            bank.release(&"alice".into(), 1),
            Err(TransferError::CustodyShortfall { .. })
        ));
    }

    #[test]
    fn refused_release_leaves_custody_intact() {
        let bank = InMemoryBank::new();
        let alice = AccountId::from("alice");
        bank.mint(&alice, 10).unwrap();
        bank.collect(&alice, 10).unwrap();
        bank.refuse_releases(&alice, "contract rejects native value");

        assert!(matches!(
            bank.release(&alice, 10),
            Err(TransferError::Rejected { .. })
        ));
        assert_eq!(bank.custody_balance(), 10);

        bank.accept_releases(&alice);
        assert!(bank.release(&alice, 10).is_ok());
    }

    #[test]
    fn mint_overflow_detected() {
        let bank = InMemoryBank::new();
        let alice = AccountId::from("alice");
        bank.mint(&alice, u64::MAX).unwrap();
        assert!(matches!(
            bank.mint(&alice, 1),
            Err(TransferError::Overflow { .. })
        ));
    }
}
