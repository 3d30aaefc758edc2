//! Ledger module.
//!
//! This module contains the double-entry transfer ledger:
//! - `Account`, `Entry`, `Transfer` - The bookkeeping model
//! - `LedgerStore` / `MemoryStore` - Transactional storage with per-account row locks
//! - `TransferEngine` - Atomic transfer with ascending-id lock ordering
//! - `validator` - Pre-condition checks run before the engine
//! - `Ledger` - Validation plus engine, with CSV batch import/export
//! - `Error` types - Record, store and transfer errors

mod account;
mod entry;
mod error;
mod service;
mod store;
mod transfer;
mod transfer_engine;
pub mod validator;

pub(crate) use rust_decimal::Decimal;

pub use account::{Account, AccountId, AccountRecord, AccountRow, Currency};
pub use entry::{Entry, EntryId};
pub use error::{Error, RecordError, StoreError, TransferError};
pub use service::{BatchSummary, Ledger};
pub use store::{CancelToken, LedgerStore, LedgerTx, MemoryStore, StoreConfig};
pub use transfer::{
    Transfer, TransferId, TransferParams, TransferRecord, TransferRequest, TransferResult,
};
pub use transfer_engine::{EngineOptions, TransferEngine};
