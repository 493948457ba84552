//! IB account queries: account updates stream and account summary.

use ibapi::accounts::{AccountSummaryResult, AccountUpdate};
use tracing::debug;

use crate::client::{IBClient, TaskKey};
use crate::events::GatewayEvent;
use crate::types::PortfolioItem;

/// Tags requested for the account summary.
pub const ACCOUNT_SUMMARY_TAGS: &[&str] = &[
    "AccountType",
    "NetLiquidation",
    "TotalCashValue",
    "SettledCash",
    "AccruedCash",
    "BuyingPower",
    "EquityWithLoanValue",
    "PreviousEquityWithLoanValue",
    "GrossPositionValue",
    "RegTEquity",
    "RegTMargin",
    "SMA",
    "InitMarginReq",
    "MaintMarginReq",
    "AvailableFunds",
    "ExcessLiquidity",
    "Cushion",
    "FullInitMarginReq",
    "FullMaintMarginReq",
    "FullAvailableFunds",
    "FullExcessLiquidity",
    "LookAheadNextChange",
    "LookAheadInitMarginReq",
    "LookAheadMaintMarginReq",
    "LookAheadAvailableFunds",
    "LookAheadExcessLiquidity",
    "HighestSeverity",
    "DayTradesRemaining",
    "Leverage",
];

impl IBClient {
    pub(crate) fn spawn_account_updates(&self, account: &str) {
        let client = self.client.clone();
        let events = self.events.clone();
        let account = account.to_string();
        debug!(account = %account, "Requesting account updates");

        let handle = tokio::spawn(async move {
            let mut subscription = match client.account_updates(&account.as_str().into()).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = events.send(GatewayEvent::Error {
                        req_id: None,
                        code: -1,
                        message: format!("account updates request failed: {e}"),
                    });
                    return;
                }
            };

            while let Some(item) = subscription.next().await {
                let event = match item {
                    Ok(AccountUpdate::AccountValue(value)) => GatewayEvent::AccountValue {
                        key: value.key,
                        value: value.value,
                        currency: value.currency,
                        account: value.account.unwrap_or_default(),
                    },
                    Ok(AccountUpdate::PortfolioValue(p)) => {
                        GatewayEvent::PortfolioValue(PortfolioItem {
                            con_id: i64::from(p.contract.contract_id),
                            symbol: p.contract.symbol.to_string(),
                            strike: p.contract.strike,
                            position: p.position,
                            market_price: p.market_price,
                            market_value: p.market_value,
                            average_cost: p.average_cost,
                            unrealized_pnl: p.unrealized_pnl,
                            realized_pnl: p.realized_pnl,
                            account: p.account.unwrap_or_default(),
                        })
                    }
                    Ok(AccountUpdate::End) => GatewayEvent::AccountDownloadEnd {
                        account: account.clone(),
                    },
                    Ok(_) => continue,
                    Err(e) => GatewayEvent::Error {
                        req_id: None,
                        code: -1,
                        message: e.to_string(),
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        self.track(TaskKey::AccountUpdates, handle);
    }

    pub(crate) fn spawn_account_summary(&self, req_id: i32) {
        let client = self.client.clone();
        let events = self.events.clone();
        debug!(req_id, "Requesting account summary");

        let handle = tokio::spawn(async move {
            let mut subscription = match client.account_summary(&"All".into(), ACCOUNT_SUMMARY_TAGS).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = events.send(GatewayEvent::Error {
                        req_id: Some(req_id),
                        code: -1,
                        message: format!("account summary request failed: {e}"),
                    });
                    return;
                }
            };

            while let Some(item) = subscription.next().await {
                match item {
                    Ok(AccountSummaryResult::Summary(s)) => {
                        let _ = events.send(GatewayEvent::AccountSummary {
                            req_id,
                            account: s.account,
                            tag: s.tag,
                            value: s.value,
                            currency: s.currency,
                        });
                    }
                    Ok(AccountSummaryResult::End) => {
                        let _ = events.send(GatewayEvent::AccountSummaryEnd { req_id });
                        break;
                    }
                    Err(e) => {
                        let _ = events.send(GatewayEvent::Error {
                            req_id: Some(req_id),
                            code: -1,
                            message: e.to_string(),
                        });
                    }
                }
            }
        });
        self.track(TaskKey::AccountSummary(req_id), handle);
    }
}
