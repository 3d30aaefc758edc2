//! Ledger storage.
//!
//! A store keeps accounts, entries and transfers, and hands out transaction
//! scopes through which all writes are issued. Two guarantees are required
//! from any implementation:
//! - a scope commits every effect at once or none of them
//! - `add_account_balance` holds an exclusive lock on the account row from
//!   the update until the scope ends, so concurrent updates of one account
//!   are serialized

mod memory;

pub use memory::MemoryStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::account::{Account, AccountId, Currency};
use super::entry::Entry;
use super::error::StoreError;
use super::transfer::Transfer;

/// Store tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Longest time a scope waits for a contended account row before giving up
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Caller-owned cancellation flag for an in-flight transaction scope.
///
/// Clones share the same flag. A cancelled scope rolls back; once a scope has
/// passed its commit point, cancelling it has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The durable home of accounts, entries and transfers.
pub trait LedgerStore: Send + Sync {
    /// Committed state of one account. Never observes uncommitted writes.
    fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Open a new account. This and transfers are the only paths that set a balance.
    fn create_account(
        &self,
        owner: &str,
        currency: Currency,
        balance: i64,
    ) -> Result<Account, StoreError>;

    /// Committed accounts ordered by id.
    fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Committed entries ordered by id.
    fn list_entries(&self) -> Result<Vec<Entry>, StoreError>;

    /// Committed transfers ordered by id.
    fn list_transfers(&self) -> Result<Vec<Transfer>, StoreError>;

    /// Run `work` inside one transaction scope.
    ///
    /// If `work` returns an error, every effect it made is discarded and the
    /// error is returned as is. If it succeeds, all effects become visible at
    /// once. Scopes must not be nested.
    fn run_in_transaction<T, E, F>(&self, cancel: &CancelToken, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>;
}

/// Operations available inside a transaction scope.
pub trait LedgerTx {
    /// Account state as seen by this scope, without taking its row lock.
    fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError>;

    /// Take the account's row lock (held until the scope ends) and return its state.
    fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError>;

    fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry, StoreError>;

    /// `amount` is stored as given; callers guarantee it is positive.
    fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, StoreError>;

    /// Add `delta` to the account balance under its row lock and return the
    /// updated account.
    fn add_account_balance(&mut self, id: AccountId, delta: i64) -> Result<Account, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_default_lock_timeout() {
        assert_eq!(StoreConfig::default().lock_timeout, Duration::from_secs(5));
    }
}
