use std::sync::Arc;

use super::account::{Account, AccountId};
use super::error::{StoreError, TransferError};
use super::store::{CancelToken, LedgerStore, LedgerTx};
use super::transfer::{TransferParams, TransferResult};

/// Behaviour switches for the [`TransferEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Lock both accounts up front and re-check the from-account balance
    /// inside the transaction. Closes the gap between validation and the
    /// debit at the cost of holding both row locks for the whole scope.
    pub recheck_balance: bool,
}

/// Turns a validated transfer into one committed unit of work: a transfer
/// row, two offsetting entries and two balance updates, or nothing at all.
///
/// The engine holds no state of its own beyond a handle to the store, so one
/// instance can be shared by any number of threads.
#[derive(Debug)]
pub struct TransferEngine<S> {
    store: Arc<S>,
    options: EngineOptions,
}

impl<S> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options,
        }
    }
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: Arc<S>, options: EngineOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Move `params.amount` from `params.from_account_id` to
    /// `params.to_account_id`.
    ///
    /// The caller has already checked that the ids differ, the amount is
    /// positive, both accounts exist and share a currency and the debit is
    /// authorized. Balances are not re-validated unless
    /// [`EngineOptions::recheck_balance`] is set. Store errors are returned
    /// unchanged inside [`TransferError::Store`] and leave no trace.
    pub fn transfer(
        &self,
        params: TransferParams,
        cancel: &CancelToken,
    ) -> Result<TransferResult, TransferError> {
        log::trace!(
            "[transfer] from={} to={} amount={}",
            params.from_account_id,
            params.to_account_id,
            params.amount
        );

        let result = self
            .store
            .run_in_transaction(cancel, |tx| self.transfer_tx(tx, params));

        match &result {
            Ok(result) => log::trace!(
                "[transfer] {} committed: from={} -> {} to={} -> {}",
                result.transfer.id(),
                result.from_account.id(),
                result.from_account.balance(),
                result.to_account.id(),
                result.to_account.balance()
            ),
            Err(err) => log::debug!(
                "[transfer] from={} to={} amount={} aborted: {err}",
                params.from_account_id,
                params.to_account_id,
                params.amount
            ),
        }
        result
    }

    fn transfer_tx(
        &self,
        tx: &mut dyn LedgerTx,
        params: TransferParams,
    ) -> Result<TransferResult, TransferError> {
        let TransferParams {
            from_account_id,
            to_account_id,
            amount,
        } = params;

        if self.options.recheck_balance {
            recheck_balance(tx, params)?;
        }

        let transfer = tx.create_transfer(from_account_id, to_account_id, amount)?;
        let from_entry = tx.create_entry(from_account_id, -amount)?;
        let to_entry = tx.create_entry(to_account_id, amount)?;

        let (from_account, to_account) = if from_account_id < to_account_id {
            add_money(tx, (from_account_id, -amount), (to_account_id, amount))?
        } else {
            let (to, from) = add_money(tx, (to_account_id, amount), (from_account_id, -amount))?;
            (from, to)
        };

        Ok(TransferResult {
            transfer,
            from_account,
            to_account,
            from_entry,
            to_entry,
        })
    }
}

/// Apply two balance deltas in the order given. Callers pass the lower
/// account id first so every transaction locks shared rows in the same order.
fn add_money(
    tx: &mut dyn LedgerTx,
    (first_id, first_delta): (AccountId, i64),
    (second_id, second_delta): (AccountId, i64),
) -> Result<(Account, Account), StoreError> {
    debug_assert!(
        first_id < second_id,
        "balance updates must follow ascending account id"
    );
    let first = tx.add_account_balance(first_id, first_delta)?;
    let second = tx.add_account_balance(second_id, second_delta)?;
    Ok((first, second))
}

/// Lock both rows in ascending id order, then check the debit is still covered.
fn recheck_balance(tx: &mut dyn LedgerTx, params: TransferParams) -> Result<(), TransferError> {
    let (low, high) = if params.from_account_id < params.to_account_id {
        (params.from_account_id, params.to_account_id)
    } else {
        (params.to_account_id, params.from_account_id)
    };
    let low_account = tx.get_account_for_update(low)?;
    let high_account = tx.get_account_for_update(high)?;
    let from_account = if low == params.from_account_id {
        low_account
    } else {
        high_account
    };

    if from_account.balance() < params.amount {
        return Err(TransferError::InsufficientFunds {
            account: from_account.id(),
            available: from_account.balance(),
            requested: params.amount,
        });
    }
    Ok(())
}
