use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::account::{Account, AccountRecord, AccountRow};
use super::error::{Error, RecordError, TransferError};
use super::store::{CancelToken, LedgerStore};
use super::transfer::{TransferRecord, TransferRequest, TransferResult};
use super::transfer_engine::{EngineOptions, TransferEngine};
use super::validator;

/// Outcome counts of one transfer batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
}

/// Request-facing side of the ledger: validates transfers before handing
/// them to the [`TransferEngine`], and reads/writes batches as CSV.
#[derive(Debug)]
pub struct Ledger<S> {
    engine: TransferEngine<S>,
    workers: usize,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, options: EngineOptions) -> Self {
        log::trace!("Ledger initialized with {options:?}");
        Self {
            engine: TransferEngine::with_options(store, options),
            workers: 1,
        }
    }

    /// Number of threads used by [`Ledger::process_transfers`]. Zero is treated as one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub fn engine(&self) -> &TransferEngine<S> {
        &self.engine
    }

    /// Validate `request` against the store, then run it through the engine.
    pub fn transfer(
        &self,
        request: &TransferRequest,
        cancel: &CancelToken,
    ) -> Result<TransferResult, TransferError> {
        let (from, to) = validator::validate(self.store().as_ref(), request)?;
        log::trace!(
            "[transfer] validated: from={} balance={} to={} balance={} currency={}",
            from.id(),
            from.balance(),
            to.id(),
            to.balance(),
            from.currency()
        );
        self.engine.transfer(request.params(), cancel)
    }

    /// Open one account per CSV row (`owner,currency,balance`, balance in
    /// major units). Stops at the first malformed row.
    pub fn load_accounts<R: Read>(&self, reader: R) -> Result<Vec<Account>, Error> {
        log::info!("Loading accounts");

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut accounts = Vec::new();
        for result in csv_reader.deserialize() {
            let record: AccountRecord = result?;
            let balance = record
                .currency
                .to_minor_units(record.balance)
                .filter(|balance| *balance >= 0);
            let Some(balance) = balance else {
                return Err(RecordError::InvalidAccount(record).into());
            };
            let account = self
                .store()
                .create_account(&record.owner, record.currency, balance)?;
            accounts.push(account);
        }

        log::info!("Loaded {} accounts", accounts.len());
        Ok(accounts)
    }

    /// Run every transfer of a CSV batch (`caller,from,to,amount`, amount in
    /// minor units).
    ///
    /// The whole batch is parsed first: a malformed row fails the batch before
    /// any transfer runs. Transfers rejected by validation or by the store are
    /// logged and skipped. Transfers are spread over the configured number of
    /// worker threads, so their relative order is not preserved.
    pub fn process_transfers<R: Read>(
        &self,
        reader: R,
        cancel: &CancelToken,
    ) -> Result<BatchSummary, Error> {
        log::info!("Starting transfer processing with {} workers", self.workers);

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut requests = Vec::new();
        for result in csv_reader.deserialize() {
            let record: TransferRecord = result?;
            log::trace!("[row {}] Parsing: {record}", requests.len() + 1);
            requests.push(TransferRequest::try_from(record)?);
        }

        let next = AtomicUsize::new(0);
        let processed = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);

        thread::scope(|scope| {
            for _ in 0..self.workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(request) = requests.get(index) else {
                        break;
                    };
                    match self.transfer(request, cancel) {
                        Ok(_) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            log::warn!("[row {}] - Skipped: {e}", index + 1);
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        let summary = BatchSummary {
            processed: processed.into_inner(),
            skipped: skipped.into_inner(),
        };
        log::info!(
            "Processing complete: {} processed, {} skipped",
            summary.processed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Write committed accounts as CSV (`id,owner,currency,balance`), ordered by id.
    pub fn export_accounts<W: Write>(&self, writer: W) -> Result<(), Error> {
        let accounts = self.store().list_accounts()?;
        log::info!("Exporting {} accounts", accounts.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for account in &accounts {
            csv_writer.serialize(AccountRow::from(account))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write committed entries as CSV, ordered by id.
    pub fn export_entries<W: Write>(&self, writer: W) -> Result<(), Error> {
        let entries = self.store().list_entries()?;
        log::info!("Exporting {} entries", entries.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for entry in &entries {
            csv_writer.serialize(entry)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write committed transfers as CSV, ordered by id.
    pub fn export_transfers<W: Write>(&self, writer: W) -> Result<(), Error> {
        let transfers = self.store().list_transfers()?;
        log::info!("Exporting {} transfers", transfers.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for transfer in &transfers {
            csv_writer.serialize(transfer)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
