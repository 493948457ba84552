//! Snapshot CSV upload command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use tws_core::AppConfig;
use tws_data::upload_csv;

#[derive(Args, Debug, Clone)]
pub struct UploadSnapshotArgs {
    /// Snapshot CSV file
    pub file: PathBuf,

    /// Instrument symbol the snapshot belongs to (defaults to the snapshot underlying)
    #[arg(long)]
    pub inst: Option<String>,

    /// Target table (defaults to store.market_data_table)
    #[arg(long)]
    pub table: Option<String>,
}

/// # Errors
/// Returns an error if the file cannot be read or the store write fails.
pub async fn run_upload_snapshot(args: UploadSnapshotArgs, config: &AppConfig) -> Result<()> {
    let store = super::open_store(&config.store).await?;
    let inst = args
        .inst
        .unwrap_or_else(|| config.snapshot.underlying.symbol.clone());
    let table = args
        .table
        .unwrap_or_else(|| config.store.market_data_table.clone());

    upload_csv(&store, &table, &args.file, &inst).await?;
    Ok(())
}
