//! Account summary and details commands.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use tws_chain_tools::portfolio;
use tws_core::AppConfig;
use tws_ib::Gateway;

#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// Account id (defaults to snapshot.account)
    #[arg(long)]
    pub account: Option<String>,

    /// Client id for this connection
    #[arg(long, default_value_t = 32)]
    pub client_id: i32,

    /// Request id of the summary subscription
    #[arg(long, default_value_t = 9001)]
    pub req_id: i32,

    /// Seconds to wait for the listing to complete
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

/// # Errors
/// Returns an error if connecting or the request fails.
pub async fn run_account_summary(args: AccountArgs, config: &AppConfig) -> Result<()> {
    let (client, mut events) = super::connect(config, Some(args.client_id)).await?;
    let result = portfolio::account_summary(
        &client,
        &mut events,
        args.req_id,
        Duration::from_secs(args.timeout_secs),
    )
    .await;
    client.disconnect().await?;
    result.map(|_| ())
}

/// # Errors
/// Returns an error if connecting or the request fails.
pub async fn run_account_details(args: AccountArgs, config: &AppConfig) -> Result<()> {
    let account = args.account.unwrap_or_else(|| config.snapshot.account.clone());
    let (client, mut events) = super::connect(config, Some(args.client_id)).await?;
    let result = portfolio::account_details(
        &client,
        &mut events,
        &account,
        Duration::from_secs(args.timeout_secs),
    )
    .await;
    client.disconnect().await?;
    result.map(|_| ())
}
