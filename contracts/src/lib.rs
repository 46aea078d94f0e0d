//! # Time-Lock Vault Contracts
//!
//! A single-asset custody ledger. Every account may hold one deposit, locked
//! until an unlock time the account picks within the policy window:
//!
//! - **Deposit** — lock a positive amount for 60 seconds up to 365 days.
//! - **Extend** — push the unlock time out, never past 365 days from now.
//! - **Withdraw** — once unlocked, clear the vault and release the funds.
//!
//! The crate splits into a pure state machine ([`time_lock_vault`]) that
//! takes the current time as input and never moves value, and a service
//! ([`service`]) that supplies the time, drives the value transfers and
//! publishes notifications.
//!
//! ## Design Principles
//!
//! 1. All arithmetic on amounts and timestamps is checked. An overflow is a
//!    rejected call, never a wrapped balance.
//! 2. Guards run before writes. A rejected call leaves no trace.
//! 3. A withdrawal clears the record before any value leaves custody.
//! 4. Every public data type is serializable (serde) for snapshots and wire
//!    transport.

pub mod clock;
pub mod config;
pub mod events;
pub mod service;
pub mod time_lock_vault;
pub mod transfer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{VaultPolicy, MAX_LOCK_DURATION, MIN_LOCK_DURATION};
pub use events::{EventRecord, VaultEvent};
pub use service::VaultService;
pub use time_lock_vault::{AccountId, CustodyRecord, VaultError, VaultInfo, VaultLedger};
pub use transfer::{InMemoryBank, TransferError, ValueTransfer};
