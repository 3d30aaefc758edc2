//! Pre-condition checks run before a transfer reaches the engine.

use super::account::{Account, AccountId};
use super::error::{StoreError, TransferError};
use super::store::LedgerStore;
use super::transfer::TransferRequest;

/// Check `request` against the current account snapshots and return both
/// accounts when the transfer may go ahead.
///
/// Checks run in a fixed order and the first failure wins:
/// 1. from-account exists
/// 2. caller owns the from-account
/// 3. from-account balance covers the amount
/// 4. to-account exists
/// 5. both accounts share a currency
///
/// The balance check reads a point-in-time snapshot. A concurrent transfer
/// may spend the same funds before the engine applies the debit; see
/// `EngineOptions::recheck_balance` for closing that gap.
pub fn validate<S: LedgerStore>(
    store: &S,
    request: &TransferRequest,
) -> Result<(Account, Account), TransferError> {
    let from_account = load(store, request.from_account_id())?;

    if from_account.owner() != request.caller() {
        return Err(TransferError::Forbidden {
            account: from_account.id(),
            caller: request.caller().to_string(),
        });
    }

    if from_account.balance() < request.amount() {
        return Err(TransferError::InsufficientFunds {
            account: from_account.id(),
            available: from_account.balance(),
            requested: request.amount(),
        });
    }

    let to_account = load(store, request.to_account_id())?;

    if from_account.currency() != to_account.currency() {
        return Err(TransferError::CurrencyMismatch {
            from: from_account.currency(),
            to: to_account.currency(),
        });
    }

    log::trace!("[validate] {request} ok");
    Ok((from_account, to_account))
}

fn load<S: LedgerStore>(store: &S, id: AccountId) -> Result<Account, TransferError> {
    store.get_account(id).map_err(|err| match err {
        StoreError::AccountNotFound { id } => TransferError::NotFound { account: id },
        other => TransferError::Store(other),
    })
}
