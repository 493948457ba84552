//! Contract-ID scraper command.

use anyhow::Result;
use chrono::Local;
use clap::Args;
use tracing::{info, warn};

use tws_chain_tools::conid::{self, ContractIdScraper};
use tws_core::AppConfig;
use tws_data::KeyValueStore;
use tws_ib::Gateway;

#[derive(Args, Debug, Clone)]
pub struct ConidScrapeArgs {
    /// Resolve ids without writing them to the store
    #[arg(long)]
    pub dry_run: bool,

    /// Client id for this connection (defaults to tws.client_id)
    #[arg(long)]
    pub client_id: Option<i32>,
}

/// # Errors
/// Returns an error if connecting, a request or the export fails.
pub async fn run_conid_scrape(args: ConidScrapeArgs, config: &AppConfig) -> Result<()> {
    let scraper = ContractIdScraper::new(&config.scraper, config.poll.clone(), Local::now().date_naive())?;
    let store = if args.dry_run {
        None
    } else {
        Some(super::open_store(&config.store).await?)
    };

    let (client, mut events) = super::connect(config, args.client_id).await?;
    let result = conid::run(
        &client,
        &mut events,
        store.as_ref().map(|s| s as &dyn KeyValueStore),
        &config.store.instruments_table,
        scraper,
    )
    .await;
    client.disconnect().await?;

    let report = result?;
    if report.outcome.missing() > 0 {
        warn!(missing = report.outcome.missing(), "Some contracts were not resolved");
    }
    info!(requested = report.requested, written = report.written, "Contract id scrape finished");
    Ok(())
}
