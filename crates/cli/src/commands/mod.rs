//! CLI commands for the TWS tools.

pub mod account;
pub mod conid_scrape;
pub mod model_db;
pub mod news_trader;
pub mod snapshot;
pub mod upload_snapshot;

pub use account::{run_account_details, run_account_summary, AccountArgs};
pub use conid_scrape::{run_conid_scrape, ConidScrapeArgs};
pub use model_db::{run_model_export, run_model_read, ModelExportArgs, ModelReadArgs};
pub use news_trader::{run_news_trader, NewsTraderArgs};
pub use snapshot::{run_snapshot, SnapshotArgs};
pub use upload_snapshot::{run_upload_snapshot, UploadSnapshotArgs};

use anyhow::{Context, Result};
use tws_core::{AppConfig, StoreConfig};
use tws_data::PgKeyValueStore;
use tws_ib::{EventReceiver, IBClient, IBConfig};

/// Connects with the configured endpoint, optionally under another client id.
pub(crate) async fn connect(config: &AppConfig, client_id: Option<i32>) -> Result<(IBClient, EventReceiver)> {
    let mut ib = IBConfig::from(&config.tws);
    if let Some(client_id) = client_id {
        ib = ib.with_client_id(client_id);
    }
    IBClient::connect(ib).await
}

pub(crate) async fn open_store(config: &StoreConfig) -> Result<PgKeyValueStore> {
    PgKeyValueStore::connect(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to the key-value store")
}
