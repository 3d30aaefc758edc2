use std::collections::btree_map::Entry as Slot;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};

use super::{CancelToken, LedgerStore, LedgerTx, StoreConfig};
use crate::ledger::account::{Account, AccountId, Currency};
use crate::ledger::entry::{Entry, EntryId};
use crate::ledger::error::StoreError;
use crate::ledger::transfer::{Transfer, TransferId};

/// How often a blocked scope wakes up to look at its cancel token.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

type RowLock = Arc<Mutex<Account>>;
type RowGuard = ArcMutexGuard<RawMutex, Account>;

/// Last committed state of every table.
#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    transfers: BTreeMap<TransferId, Transfer>,
    entries: BTreeMap<EntryId, Entry>,
}

/// In-process ledger store with per-account row locks.
///
/// Every account has a write lock guarding a working copy of the row. A
/// transaction takes that lock on its first write to the account and keeps
/// it until it commits or rolls back, which serializes concurrent balance
/// updates of one account. Readers only ever see the committed tables, which
/// a commit replaces under a single write lock so that all effects of one
/// transaction appear together.
///
/// Lock order inside the store is `rows` before `committed`; row locks are
/// never waited on while either map lock is held.
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    rows: RwLock<BTreeMap<AccountId, RowLock>>,
    committed: RwLock<Tables>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
    next_transfer_id: AtomicI64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        log::trace!("MemoryStore initialized with {config:?}");
        Self {
            config,
            rows: RwLock::new(BTreeMap::new()),
            committed: RwLock::new(Tables::default()),
            next_account_id: AtomicI64::new(1),
            next_entry_id: AtomicI64::new(1),
            next_transfer_id: AtomicI64::new(1),
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    pub fn get_entry(&self, id: EntryId) -> Result<Entry, StoreError> {
        self.committed
            .read()
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::EntryNotFound { id })
    }

    pub fn get_transfer(&self, id: TransferId) -> Result<Transfer, StoreError> {
        self.committed
            .read()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::TransferNotFound { id })
    }

    /// Committed entries of one account ordered by id.
    pub fn account_entries(&self, account_id: AccountId) -> Vec<Entry> {
        self.committed
            .read()
            .entries
            .values()
            .filter(|entry| entry.account_id() == account_id)
            .cloned()
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.committed.read().entries.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.committed.read().transfers.len()
    }

    /// Drop every account, entry and transfer. Test helper; must not run
    /// while transactions are in flight. Ids are not reset.
    pub fn delete_all(&self) {
        let mut rows = self.rows.write();
        let mut tables = self.committed.write();
        rows.clear();
        *tables = Tables::default();
        log::debug!("All ledger rows deleted");
    }

    fn row_lock(&self, id: AccountId) -> Option<RowLock> {
        self.rows.read().get(&id).cloned()
    }

    fn account_exists(&self, id: AccountId) -> bool {
        self.rows.read().contains_key(&id)
    }

    /// Wait for the account's row lock, bounded by the lock timeout and the
    /// caller's cancel token.
    fn acquire_row(&self, id: AccountId, cancel: &CancelToken) -> Result<RowGuard, StoreError> {
        let Some(row) = self.row_lock(id) else {
            return Err(StoreError::AccountNotFound { id });
        };
        let deadline = Instant::now() + self.config.lock_timeout;

        let mut waited = false;
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(guard) = row.try_lock_arc_for(remaining.min(LOCK_POLL_INTERVAL)) {
                if waited {
                    log::trace!("[store] acquired contended row lock on account {id}");
                }
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                log::debug!("[store] lock wait on account {id} timed out");
                return Err(StoreError::LockTimeout { account: id });
            }
            if !waited {
                log::trace!("[store] waiting for row lock on account {id}");
                waited = true;
            }
        }
    }

    fn next_id(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.committed
            .read()
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::AccountNotFound { id })
    }

    fn create_account(
        &self,
        owner: &str,
        currency: Currency,
        balance: i64,
    ) -> Result<Account, StoreError> {
        let id = Self::next_id(&self.next_account_id);
        let account = Account::new(id, owner.to_string(), balance, currency);

        let mut rows = self.rows.write();
        let mut tables = self.committed.write();
        rows.insert(id, Arc::new(Mutex::new(account.clone())));
        tables.accounts.insert(id, account.clone());

        log::debug!(
            "[store] created account {id} owner={owner} currency={currency} balance={balance}"
        );
        Ok(account)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.committed.read().accounts.values().cloned().collect())
    }

    fn list_entries(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self.committed.read().entries.values().cloned().collect())
    }

    fn list_transfers(&self) -> Result<Vec<Transfer>, StoreError> {
        Ok(self.committed.read().transfers.values().cloned().collect())
    }

    fn run_in_transaction<T, E, F>(&self, cancel: &CancelToken, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled.into());
        }

        let mut tx = MemoryTx::new(self, cancel);
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                log::trace!("[store] work failed, rolling back");
                drop(tx);
                Err(err)
            }
        }
    }
}

/// A row lock held by a transaction plus the balance to restore on rollback.
struct HeldRow {
    guard: RowGuard,
    original_balance: i64,
}

/// Transaction scope over a [`MemoryStore`].
///
/// Journal rows are buffered until commit. Balance updates are written to the
/// locked working copies and undone on drop unless the scope committed.
struct MemoryTx<'a> {
    store: &'a MemoryStore,
    cancel: &'a CancelToken,
    held: BTreeMap<AccountId, HeldRow>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    committed: bool,
}

impl<'a> MemoryTx<'a> {
    fn new(store: &'a MemoryStore, cancel: &'a CancelToken) -> Self {
        Self {
            store,
            cancel,
            held: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
            committed: false,
        }
    }

    /// Row lock for `id`, taken on first use and kept until the scope ends.
    fn lock_row(&mut self, id: AccountId) -> Result<&mut HeldRow, StoreError> {
        match self.held.entry(id) {
            Slot::Occupied(slot) => Ok(slot.into_mut()),
            Slot::Vacant(slot) => {
                let guard = self.store.acquire_row(id, self.cancel)?;
                let original_balance = guard.balance();
                Ok(slot.insert(HeldRow {
                    guard,
                    original_balance,
                }))
            }
        }
    }

    /// Publish all buffered effects in one step. The cancel token is checked
    /// one last time before the commit point.
    fn commit(mut self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            log::debug!("[store] cancelled before commit, rolling back");
            return Err(StoreError::Cancelled);
        }

        let transfers = std::mem::take(&mut self.transfers);
        let entries = std::mem::take(&mut self.entries);
        {
            let mut tables = self.store.committed.write();
            for (id, row) in &self.held {
                tables.accounts.insert(*id, Account::clone(&row.guard));
            }
            for transfer in transfers {
                tables.transfers.insert(transfer.id(), transfer);
            }
            for entry in entries {
                tables.entries.insert(entry.id(), entry);
            }
        }
        self.committed = true;

        log::trace!("[store] committed, releasing {} row locks", self.held.len());
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for row in self.held.values_mut() {
            row.guard.set_balance(row.original_balance);
        }
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn get_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        match self.held.get(&id) {
            Some(row) => Ok(Account::clone(&row.guard)),
            None => self.store.get_account(id),
        }
    }

    fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, StoreError> {
        let row = self.lock_row(id)?;
        log::trace!("[store] locked account {id} for update");
        Ok(Account::clone(&row.guard))
    }

    fn create_entry(&mut self, account_id: AccountId, amount: i64) -> Result<Entry, StoreError> {
        if !self.store.account_exists(account_id) {
            return Err(StoreError::ForeignKey {
                account: account_id,
            });
        }
        let id = MemoryStore::next_id(&self.store.next_entry_id);
        let entry = Entry::new(id, account_id, amount);
        log::trace!("[store] entry {id} account={account_id} amount={amount}");
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn create_transfer(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: i64,
    ) -> Result<Transfer, StoreError> {
        for account in [from_account_id, to_account_id] {
            if !self.store.account_exists(account) {
                return Err(StoreError::ForeignKey { account });
            }
        }
        let id = MemoryStore::next_id(&self.store.next_transfer_id);
        let transfer = Transfer::new(id, from_account_id, to_account_id, amount);
        log::trace!(
            "[store] transfer {id} from={from_account_id} to={to_account_id} amount={amount}"
        );
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    fn add_account_balance(
        &mut self,
        account_id: AccountId,
        delta: i64,
    ) -> Result<Account, StoreError> {
        let row = self.lock_row(account_id)?;
        let Some(balance) = row.guard.apply_delta(delta) else {
            return Err(StoreError::BalanceOverflow {
                account: account_id,
                delta,
            });
        };
        log::trace!("[store] account {account_id} balance += {delta} -> {balance}");
        Ok(Account::clone(&row.guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn store_with_two_accounts() -> (MemoryStore, Account, Account) {
        let store = MemoryStore::default();
        let a = store.create_account("alice", Currency::Usd, 1_000).unwrap();
        let b = store.create_account("bob", Currency::Usd, 500).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_create_account_assigns_increasing_ids() {
        let (store, a, b) = store_with_two_accounts();
        assert!(b.id() > a.id());
        assert_eq!(store.get_account(a.id()).unwrap(), a);
        assert_eq!(store.list_accounts().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_get_missing_account() {
        let store = MemoryStore::default();
        assert_eq!(
            store.get_account(42),
            Err(StoreError::AccountNotFound { id: 42 })
        );
    }

    #[test]
    fn test_new_keeps_config() {
        let store = MemoryStore::new(StoreConfig {
            lock_timeout: Duration::from_millis(250),
        });
        assert_eq!(store.config().lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_commit_publishes_all_effects() {
        let (store, a, b) = store_with_two_accounts();
        let cancel = CancelToken::new();

        let entry = store
            .run_in_transaction(&cancel, |tx| -> Result<Entry, StoreError> {
                tx.create_transfer(a.id(), b.id(), 10)?;
                let entry = tx.create_entry(a.id(), -10)?;
                tx.add_account_balance(a.id(), -10)?;
                Ok(entry)
            })
            .unwrap();

        assert_eq!(store.get_account(a.id()).unwrap().balance(), 990);
        assert_eq!(store.get_entry(entry.id()).unwrap(), entry);
        assert_eq!(store.transfer_count(), 1);
        assert_eq!(store.account_entries(a.id()), vec![entry]);
    }

    #[test]
    fn test_failed_work_discards_everything() {
        let (store, a, b) = store_with_two_accounts();
        let cancel = CancelToken::new();

        let result = store.run_in_transaction(&cancel, |tx| -> Result<(), StoreError> {
            tx.create_transfer(a.id(), b.id(), 10)?;
            tx.create_entry(a.id(), -10)?;
            tx.add_account_balance(a.id(), -10)?;
            Err(StoreError::Backend("boom".to_string()))
        });

        assert_eq!(result, Err(StoreError::Backend("boom".to_string())));
        assert_eq!(store.get_account(a.id()).unwrap().balance(), 1_000);
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.transfer_count(), 0);

        // The working copy was restored too, so the next scope starts clean
        store
            .run_in_transaction(&cancel, |tx| tx.add_account_balance(a.id(), 1))
            .unwrap();
        assert_eq!(store.get_account(a.id()).unwrap().balance(), 1_001);
    }

    #[test]
    fn test_uncommitted_balance_is_invisible_to_readers() {
        let (store, a, _) = store_with_two_accounts();
        let cancel = CancelToken::new();

        store
            .run_in_transaction(&cancel, |tx| -> Result<(), StoreError> {
                let updated = tx.add_account_balance(a.id(), -300)?;
                assert_eq!(updated.balance(), 700);
                assert_eq!(tx.get_account(a.id())?.balance(), 700);
                assert_eq!(store.get_account(a.id())?.balance(), 1_000);
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_account(a.id()).unwrap().balance(), 700);
    }

    #[test]
    fn test_foreign_key_checks() {
        let (store, a, _) = store_with_two_accounts();
        let cancel = CancelToken::new();

        let entry = store.run_in_transaction(&cancel, |tx| tx.create_entry(99, 5));
        assert_eq!(entry, Err(StoreError::ForeignKey { account: 99 }));

        let transfer = store.run_in_transaction(&cancel, |tx| tx.create_transfer(a.id(), 99, 5));
        assert_eq!(transfer, Err(StoreError::ForeignKey { account: 99 }));
    }

    #[test]
    fn test_balance_overflow_is_a_store_error() {
        let store = MemoryStore::default();
        let a = store
            .create_account("alice", Currency::Eur, i64::MAX)
            .unwrap();
        let cancel = CancelToken::new();

        let result = store.run_in_transaction(&cancel, |tx| tx.add_account_balance(a.id(), 1));
        assert_eq!(
            result,
            Err(StoreError::BalanceOverflow {
                account: a.id(),
                delta: 1
            })
        );
        assert_eq!(store.get_account(a.id()).unwrap().balance(), i64::MAX);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (store, a, _) = store_with_two_accounts();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = store.run_in_transaction(&cancel, |tx| tx.add_account_balance(a.id(), 1));
        assert_eq!(result, Err(StoreError::Cancelled));
        assert_eq!(store.get_account(a.id()).unwrap().balance(), 1_000);
    }

    #[test]
    fn test_cancelled_before_commit_rolls_back() {
        let (store, a, b) = store_with_two_accounts();
        let cancel = CancelToken::new();

        let result = store.run_in_transaction(&cancel, |tx| -> Result<(), StoreError> {
            tx.create_transfer(a.id(), b.id(), 10)?;
            tx.add_account_balance(a.id(), -10)?;
            cancel.cancel();
            Ok(())
        });

        assert_eq!(result, Err(StoreError::Cancelled));
        assert_eq!(store.get_account(a.id()).unwrap().balance(), 1_000);
        assert_eq!(store.transfer_count(), 0);
    }

    #[test]
    fn test_row_lock_is_held_until_scope_ends() {
        let store = MemoryStore::new(StoreConfig {
            lock_timeout: Duration::from_millis(50),
        });
        let id = store
            .create_account("alice", Currency::Usd, 100)
            .unwrap()
            .id();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let store = &store;

        thread::scope(|s| {
            s.spawn(move || {
                store
                    .run_in_transaction(&CancelToken::new(), |tx| -> Result<(), StoreError> {
                        tx.add_account_balance(id, 1)?;
                        locked_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            });

            locked_rx.recv().unwrap();
            let cancel = CancelToken::new();
            let result = store.run_in_transaction(&cancel, |tx| tx.add_account_balance(id, 1));
            assert_eq!(result, Err(StoreError::LockTimeout { account: id }));
            release_tx.send(()).unwrap();
        });

        assert_eq!(store.get_account(id).unwrap().balance(), 101);
    }

    #[test]
    fn test_cancel_interrupts_lock_wait() {
        let store = MemoryStore::default();
        let id = store
            .create_account("alice", Currency::Usd, 100)
            .unwrap()
            .id();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let cancel = CancelToken::new();
        let store = &store;

        thread::scope(|s| {
            s.spawn(move || {
                store
                    .run_in_transaction(&CancelToken::new(), |tx| -> Result<(), StoreError> {
                        tx.get_account_for_update(id)?;
                        locked_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            });

            locked_rx.recv().unwrap();
            let waiter = s.spawn(|| {
                store.run_in_transaction(&cancel, |tx| tx.add_account_balance(id, 5))
            });
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
            assert_eq!(waiter.join().unwrap(), Err(StoreError::Cancelled));
            release_tx.send(()).unwrap();
        });

        assert_eq!(store.get_account(id).unwrap().balance(), 100);
    }

    #[test]
    fn test_delete_all_clears_tables() {
        let (store, a, b) = store_with_two_accounts();
        let cancel = CancelToken::new();
        store
            .run_in_transaction(&cancel, |tx| tx.create_transfer(a.id(), b.id(), 1))
            .unwrap();

        store.delete_all();

        assert!(store.list_accounts().unwrap().is_empty());
        assert_eq!(store.transfer_count(), 0);
        let c = store.create_account("carol", Currency::Irr, 0).unwrap();
        assert!(c.id() > b.id());
    }
}
