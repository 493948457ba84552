//! Interactive news trader command.

use anyhow::Result;
use clap::Args;
use tokio::io::BufReader;
use tracing::info;

use tws_core::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct NewsTraderArgs {
    /// Contract month to trade, `YYYYMM` (defaults to trader.expiry)
    #[arg(long)]
    pub expiry: Option<String>,

    /// Wait for the `H` command instead of going hot on the first price
    #[arg(long)]
    pub manual: bool,

    /// Client id for this connection (defaults to tws.client_id)
    #[arg(long)]
    pub client_id: Option<i32>,
}

/// # Errors
/// Returns an error if connecting fails or the trader cannot shut down cleanly.
pub async fn run_news_trader(args: NewsTraderArgs, config: &AppConfig) -> Result<()> {
    let mut trader = config.trader.clone();
    if let Some(expiry) = args.expiry {
        trader.expiry = expiry;
    }
    if args.manual {
        trader.arm_on_start = false;
    }
    info!(symbol = %trader.symbol, expiry = %trader.expiry, "News trader init");

    let (client, mut events) = super::connect(config, args.client_id).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let pnl = tws_news_trader::run(&client, &mut events, trader, stdin).await?;

    info!(%pnl, "News trader exiting");
    Ok(())
}
