use super::account::{AccountId, AccountRecord, Currency};
use super::entry::EntryId;
use super::transfer::{TransferId, TransferRecord};

/// Top-level error type for the batch surface of the ledger.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Malformed input rows (hard errors, they stop a batch).
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(TransferRecord),

    #[error("Invalid account: {0}")]
    InvalidAccount(AccountRecord),
}

/// Failures raised by a ledger store. Any of them inside a transaction scope
/// rolls the whole scope back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Account {id} not found")]
    AccountNotFound { id: AccountId },

    #[error("Entry {id} not found")]
    EntryNotFound { id: EntryId },

    #[error("Transfer {id} not found")]
    TransferNotFound { id: TransferId },

    #[error("Foreign key violation: account {account} does not exist")]
    ForeignKey { account: AccountId },

    #[error("Balance overflow on account {account} applying {delta}")]
    BalanceOverflow { account: AccountId, delta: i64 },

    #[error("Timed out waiting for the lock on account {account}")]
    LockTimeout { account: AccountId },

    #[error("Transaction cancelled")]
    Cancelled,

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Outcomes of a transfer that did not commit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("Account {account} not found")]
    NotFound { account: AccountId },

    #[error("Forbidden: account {account} does not belong to {caller}")]
    Forbidden { account: AccountId, caller: String },

    #[error("Insufficient funds: account {account} has {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        requested: i64,
    },

    #[error("Currency mismatch: from account holds {from}, to account holds {to}")]
    CurrencyMismatch { from: Currency, to: Currency },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}
