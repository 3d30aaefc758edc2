mod commands;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Args;
use ledger_engine::{CancelToken, EngineOptions, Ledger, MemoryStore, StoreConfig};

fn main() -> Result<()> {
    // Parse the CLI arguments
    let args = Args::parse();

    // Initialize logger with default level of info (can be overridden with RUST_LOG)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Initialize the store and ledger
    let store = Arc::new(MemoryStore::new(StoreConfig {
        lock_timeout: Duration::from_millis(args.lock_timeout_ms),
    }));
    let options = EngineOptions {
        recheck_balance: args.recheck_balance,
    };
    let ledger = Ledger::new(store, options).with_workers(args.workers);

    // 2. Open accounts
    log::info!("Loading accounts from {}", args.accounts_file.display());
    let accounts = open(&args.accounts_file)?;
    ledger
        .load_accounts(accounts)
        .context("Failed to load accounts")?;

    // 3. Run the transfers
    log::info!(
        "Processing transfers from {}",
        args.transfers_file.display()
    );
    let transfers = open(&args.transfers_file)?;
    let summary = ledger
        .process_transfers(transfers, &CancelToken::new())
        .context("Failed to process transfers")?;

    log::info!(
        "Processing complete ({} processed, {} skipped), exporting accounts",
        summary.processed,
        summary.skipped
    );

    // 4. Journal dumps, if asked for
    if let Some(path) = &args.entries {
        let file = create(path)?;
        ledger
            .export_entries(file)
            .with_context(|| format!("Failed to export entries to {}", path.display()))?;
    }
    if let Some(path) = &args.transfers_out {
        let file = create(path)?;
        ledger
            .export_transfers(file)
            .with_context(|| format!("Failed to export transfers to {}", path.display()))?;
    }

    // 5. Export the accounts to stdout
    ledger
        .export_accounts(std::io::stdout())
        .context("Failed to export accounts to stdout")?;

    log::info!("Export complete");

    Ok(())
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open input file: {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))
}
