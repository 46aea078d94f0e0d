//! # Vault Service
//!
//! Wires the pure [`VaultLedger`] to its collaborators: a [`Clock`] for the
//! current time, a [`ValueTransfer`] for moving money, and a broadcast
//! channel for notifications.
//!
//! ## Locking
//!
//! The ledger sits behind a single `parking_lot::Mutex`. Deposits validate,
//! collect the incoming value and commit the record under that lock, so a
//! failed collection leaves nothing behind. Withdrawals clear the record
//! under the lock, then **drop it** before releasing value. A release that
//! calls back into the service sees no vault and cannot drain it twice.
//!
//! ## Failed releases
//!
//! If the release fails after the record was cleared, the call returns
//! [`VaultError::TransferFailed`] and the record stays cleared. The amount
//! has left the ledger's books but not reached the account; this is logged
//! at `error` level for out-of-band reconciliation and never retried.
//!
//! ## Event order
//!
//! Every committed transition takes a sequence number under the ledger lock.
//! Events go to the channel strictly in that order: a deposit made while an
//! earlier withdrawal's release is still in flight is held back until the
//! withdrawal settles. A failed release settles its slot with nothing to
//! send, so later events are never stuck behind it.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::VaultPolicy;
use crate::events::{EventRecord, VaultEvent, EVENT_CHANNEL_CAPACITY};
use crate::time_lock_vault::{AccountId, CustodyRecord, VaultError, VaultInfo, VaultLedger};
use crate::transfer::ValueTransfer;

/// Ledger plus the event sequence counter and the publication queue,
/// guarded together so channel order matches commit order.
#[derive(Debug)]
struct LedgerState {
    ledger: VaultLedger,
    next_sequence: u64,
    /// Lowest sequence not yet sent or skipped.
    next_to_publish: u64,
    /// Settled slots waiting on an earlier one. `None` marks an operation
    /// that committed but publishes nothing (a failed release).
    pending: BTreeMap<u64, Option<EventRecord>>,
}

impl LedgerState {
    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Files the outcome for `sequence` and sends every consecutive settled
    /// slot from `next_to_publish` onward.
    fn settle(
        &mut self,
        sequence: u64,
        slot: Option<EventRecord>,
        events: &broadcast::Sender<EventRecord>,
    ) {
        self.pending.insert(sequence, slot);
        while let Some(slot) = self.pending.remove(&self.next_to_publish) {
            if let Some(record) = slot {
                // No subscribers is not an error.
                let _ = events.send(record);
            }
            self.next_to_publish += 1;
        }
    }
}

/// Thread-safe front door to the vault.
pub struct VaultService<C, T> {
    state: Mutex<LedgerState>,
    clock: C,
    transfer: T,
    events: broadcast::Sender<EventRecord>,
}

impl<C: Clock, T: ValueTransfer> VaultService<C, T> {
    /// Creates a service over an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Policy`] if `policy` is invalid.
    pub fn new(policy: VaultPolicy, clock: C, transfer: T) -> Result<Self, VaultError> {
        Ok(Self::from_ledger(VaultLedger::new(policy)?, clock, transfer))
    }

    /// Creates a service over an existing (e.g. restored) ledger.
    pub fn from_ledger(ledger: VaultLedger, clock: C, transfer: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(LedgerState {
                ledger,
                next_sequence: 0,
                next_to_publish: 0,
                pending: BTreeMap::new(),
            }),
            clock,
            transfer,
            events,
        }
    }

    /// Subscribes to vault notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// The clock this service reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The transfer primitive this service drives.
    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Locks `amount` from `account` for `lock_duration` seconds.
    ///
    /// # Errors
    ///
    /// Any guard failure from [`VaultLedger::check_deposit`], or
    /// [`VaultError::TransferFailed`] if the value could not be collected.
    /// In every case the ledger is unchanged.
    pub fn deposit(
        &self,
        account: &AccountId,
        amount: u64,
        lock_duration: u64,
    ) -> Result<CustodyRecord, VaultError> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        if let Err(err) = state
            .ledger
            .check_deposit(account, amount, lock_duration, now)
        {
            debug!(%account, amount, lock_duration, error = %err, "deposit rejected");
            return Err(err);
        }

        self.transfer.collect(account, amount).map_err(|source| {
            debug!(%account, amount, error = %source, "deposit collection failed");
            VaultError::TransferFailed {
                account: account.clone(),
                amount,
                source,
            }
        })?;

        // Validated under this same lock above.
        let record = state.ledger.deposit(account, amount, lock_duration, now)?;

        info!(
            %account,
            amount,
            unlock_time = record.unlock_time,
            "vault opened"
        );

        let sequence = state.take_sequence();
        let event = EventRecord {
            sequence,
            timestamp: now,
            event: VaultEvent::Deposited {
                account: account.clone(),
                amount,
                unlock_time: record.unlock_time,
            },
        };
        state.settle(sequence, Some(event), &self.events);

        Ok(record)
    }

    /// Releases the account's unlocked vault and returns the amount paid out.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoActiveVault`] / [`VaultError::VaultStillLocked`] with
    ///   the ledger unchanged.
    /// - [`VaultError::TransferFailed`] if the release failed. The record is
    ///   already cleared at that point.
    pub fn withdraw(&self, account: &AccountId) -> Result<u64, VaultError> {
        let (release, sequence, now) = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            let release = state.ledger.withdraw(account, now).map_err(|err| {
                debug!(%account, error = %err, "withdraw rejected");
                err
            })?;
            (release, state.take_sequence(), now)
        };

        if let Err(source) = self.transfer.release(&release.account, release.amount) {
            self.state.lock().settle(sequence, None, &self.events);
            error!(
                account = %release.account,
                amount = release.amount,
                error = %source,
                "release failed after vault was cleared; funds need reconciliation"
            );
            return Err(VaultError::TransferFailed {
                account: release.account,
                amount: release.amount,
                source,
            });
        }

        info!(account = %release.account, amount = release.amount, "vault released");

        let amount = release.amount;
        let event = EventRecord {
            sequence,
            timestamp: now,
            event: VaultEvent::Withdrawn {
                account: release.account,
                amount,
            },
        };
        self.state.lock().settle(sequence, Some(event), &self.events);

        Ok(amount)
    }

    /// Pushes the account's unlock time out by `additional_duration` seconds
    /// and returns the new unlock time.
    ///
    /// # Errors
    ///
    /// See [`VaultLedger::extend`]. The ledger is unchanged on error.
    pub fn extend_lock_time(
        &self,
        account: &AccountId,
        additional_duration: u64,
    ) -> Result<u64, VaultError> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let new_unlock_time = state
            .ledger
            .extend(account, additional_duration, now)
            .map_err(|err| {
                debug!(%account, additional_duration, error = %err, "extend rejected");
                err
            })?;

        info!(%account, new_unlock_time, "vault extended");

        let sequence = state.take_sequence();
        let event = EventRecord {
            sequence,
            timestamp: now,
            event: VaultEvent::VaultExtended {
                account: account.clone(),
                new_unlock_time,
            },
        };
        state.settle(sequence, Some(event), &self.events);

        Ok(new_unlock_time)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The account's vault as of now.
    pub fn vault_info(&self, account: &AccountId) -> VaultInfo {
        let state = self.state.lock();
        state.ledger.vault_info(account, self.clock.now())
    }

    /// Whether the account could withdraw right now.
    pub fn can_withdraw(&self, account: &AccountId) -> bool {
        let state = self.state.lock();
        state.ledger.can_withdraw(account, self.clock.now())
    }

    /// Total value held across all vaults.
    pub fn contract_balance(&self) -> u64 {
        self.state.lock().ledger.contract_balance()
    }

    /// Number of accounts with funds locked.
    pub fn active_vaults(&self) -> usize {
        self.state.lock().ledger.active_vaults()
    }

    /// Serializes the current ledger. See [`VaultLedger::to_snapshot`].
    pub fn snapshot(&self) -> Result<String, VaultError> {
        self.state.lock().ledger.to_snapshot()
    }
}
