//! Account download: portfolio positions from the account update stream.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use tws_core::{recv_until, WaitOutcome};
use tws_ib::events::log_api_error;
use tws_ib::{EventReceiver, Gateway, GatewayEvent, PortfolioItem};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldPosition {
    pub position: f64,
    pub average_cost: f64,
    pub strike: f64,
}

/// conId → held position, restricted to one underlying symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub positions: BTreeMap<i64, HeldPosition>,
}

impl AccountSnapshot {
    /// Records `item` if it belongs to `symbol`.
    pub fn record(&mut self, item: &PortfolioItem, symbol: &str) {
        if item.symbol != symbol {
            return;
        }
        self.positions.insert(
            item.con_id,
            HeldPosition {
                position: item.position,
                average_cost: item.average_cost,
                strike: item.strike,
            },
        );
    }

    /// Lowest and highest held strike.
    pub fn strike_range(&self) -> Option<(f64, f64)> {
        let strikes = self.positions.values().map(|p| p.strike);
        strikes.fold(None, |range, s| match range {
            None => Some((s, s)),
            Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
        })
    }
}

/// Requests account updates and collects positions in `symbol` until TWS
/// signals the end of the download.
///
/// # Errors
/// Returns an error if the request fails or the event channel closes.
pub async fn download_account(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    account: &str,
    symbol: &str,
    timeout: Duration,
) -> Result<AccountSnapshot> {
    let mut snapshot = AccountSnapshot::default();
    gateway.request_account_updates(account).await?;

    let outcome = recv_until(events, timeout, |event| match event {
        GatewayEvent::PortfolioValue(item) => {
            snapshot.record(&item, symbol);
            false
        }
        GatewayEvent::AccountDownloadEnd { account } => {
            debug!(account = %account, "All account data received");
            true
        }
        GatewayEvent::Error { req_id, code, message } => {
            log_api_error(req_id, code, &message);
            false
        }
        _ => false,
    })
    .await;

    match outcome {
        WaitOutcome::Finished => {}
        WaitOutcome::TimedOut => {
            warn!(account, positions = snapshot.positions.len(), "Account download timed out, using partial data");
        }
        WaitOutcome::Disconnected => bail!("Gateway closed during account download"),
    }
    gateway.cancel_account_updates().await?;

    Ok(snapshot)
}
