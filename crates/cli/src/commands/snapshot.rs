//! Market snapshot command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use clap::Args;
use tracing::{error, info};

use tws_chain_tools::snapshot::{self, SnapshotScraper, SnapshotSinks};
use tws_core::AppConfig;
use tws_data::KeyValueStore;
use tws_ib::Gateway;

#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Write snapshot to the key-value store
    #[arg(long)]
    pub db: bool,

    /// Write snapshot to the given CSV file (snapshot.csv_path when omitted)
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    pub csv: Option<Option<PathBuf>>,

    /// Client id for this connection (defaults to tws.client_id)
    #[arg(long)]
    pub client_id: Option<i32>,
}

/// # Errors
/// Returns an error if connecting, a request or the CSV write fails.
pub async fn run_snapshot(args: SnapshotArgs, config: &AppConfig) -> Result<()> {
    let csv = args
        .csv
        .map(|path| path.unwrap_or_else(|| PathBuf::from(&config.snapshot.csv_path)));
    let store = if args.db {
        Some(super::open_store(&config.store).await?)
    } else {
        None
    };
    let scraper = SnapshotScraper::new(
        config.snapshot.clone(),
        config.poll.clone(),
        Local::now().date_naive(),
    );
    let sinks = SnapshotSinks {
        store: store.as_ref().map(|s| s as &dyn KeyValueStore),
        instruments_table: config.store.instruments_table.clone(),
        market_data_table: config.store.market_data_table.clone(),
        csv,
    };

    let (client, mut events) = super::connect(config, args.client_id).await?;
    let result = snapshot::run(&client, &mut events, scraper, sinks).await;
    client.disconnect().await?;

    let report = result?;
    info!(
        requested = report.requested,
        missing = report.outcome.missing(),
        rows = report.table.len(),
        "Snapshot finished"
    );
    if report.exported == Some(false) {
        error!("Snapshot was not stored");
    }
    Ok(())
}
