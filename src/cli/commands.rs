pub(crate) use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ledger-engine",
    author,
    version,
    about = "Run a batch of balance transfers against a double-entry ledger",
    long_about = None,
    after_help = "INPUT:\n    ACCOUNTS columns: owner, currency, balance (major units, e.g. 10.50)\n    TRANSFERS columns: caller, from, to, amount (minor units, e.g. 1050)\n    Account ids are assigned from 1 in ACCOUNTS row order.\n\nOUTPUT:\n    Final accounts are printed to stdout in CSV format.\n    Use shell redirection to save to a file:\n\n    ledger-engine accounts.csv transfers.csv > balances.csv"
)]
pub struct Args {
    /// Path to the accounts CSV file
    #[arg(index = 1, value_name = "ACCOUNTS")]
    pub accounts_file: PathBuf,

    /// Path to the transfers CSV file
    #[arg(index = 2, value_name = "TRANSFERS")]
    pub transfers_file: PathBuf,

    /// Number of threads running transfers concurrently
    #[arg(long, env = "LEDGER_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// How long a transfer waits for a locked account before failing
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    pub lock_timeout_ms: u64,

    /// Re-check the debited balance inside the transfer's transaction
    #[arg(long, env = "LEDGER_RECHECK_BALANCE")]
    pub recheck_balance: bool,

    /// Also write every committed entry to this CSV file
    #[arg(long, value_name = "FILE")]
    pub entries: Option<PathBuf>,

    /// Also write every committed transfer to this CSV file
    #[arg(long = "transfers-out", value_name = "FILE")]
    pub transfers_out: Option<PathBuf>,
}
