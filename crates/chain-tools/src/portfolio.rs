//! Account summary and account details listings.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use tws_core::{recv_until, WaitOutcome};
use tws_ib::events::log_api_error;
use tws_ib::{EventReceiver, Gateway, GatewayEvent, PortfolioItem};

const RULE: &str = "-------------------------------------";

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLine {
    pub account: String,
    pub tag: String,
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountValueLine {
    pub key: String,
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountDetails {
    pub values: Vec<AccountValueLine>,
    pub portfolio: Vec<PortfolioItem>,
}

impl AccountDetails {
    pub fn unrealized_pnl(&self) -> f64 {
        self.portfolio.iter().map(|p| p.unrealized_pnl).sum()
    }
}

fn summary_line(tag: &str, value: &str, currency: &str) -> String {
    format!("{tag:<25}\t{value} {currency}")
}

fn value_line(key: &str, value: &str, currency: &str) -> String {
    format!("{key:<30}\t{value:>10} {currency}")
}

fn portfolio_line(item: &PortfolioItem) -> String {
    let price = (item.market_price * 1000.0).round() / 1000.0;
    format!(
        "{:<5} {:>6} {:>5} {:>10}",
        item.symbol, item.position, price, item.unrealized_pnl
    )
}

fn finish(outcome: WaitOutcome, what: &str) -> Result<()> {
    match outcome {
        WaitOutcome::Finished => Ok(()),
        WaitOutcome::TimedOut => {
            warn!("{what} timed out, listing may be partial");
            Ok(())
        }
        WaitOutcome::Disconnected => bail!("Gateway closed during {what}"),
    }
}

/// Lists the account summary for group `All` until TWS signals its end.
///
/// # Errors
/// Returns an error if the request fails or the event channel closes.
pub async fn account_summary(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    req_id: i32,
    timeout: Duration,
) -> Result<Vec<SummaryLine>> {
    let mut lines = Vec::new();
    info!("-------------- Account --------------");
    gateway.request_account_summary(req_id).await?;

    let outcome = recv_until(events, timeout, |event| match event {
        GatewayEvent::AccountSummary {
            account,
            tag,
            value,
            currency,
            ..
        } => {
            info!("{}", summary_line(&tag, &value, &currency));
            lines.push(SummaryLine {
                account,
                tag,
                value,
                currency,
            });
            false
        }
        GatewayEvent::AccountSummaryEnd { req_id: end } => end == req_id,
        GatewayEvent::Error { req_id, code, message } => {
            log_api_error(req_id, code, &message);
            false
        }
        _ => false,
    })
    .await;
    info!("{RULE}");

    finish(outcome, "account summary")?;
    Ok(lines)
}

/// Lists account values and portfolio lines until the account download ends,
/// then cancels the subscription.
///
/// # Errors
/// Returns an error if a request fails or the event channel closes.
pub async fn account_details(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    account: &str,
    timeout: Duration,
) -> Result<AccountDetails> {
    let mut details = AccountDetails::default();
    info!("-------------- Account --------------");
    gateway.request_account_updates(account).await?;

    let outcome = recv_until(events, timeout, |event| match event {
        GatewayEvent::AccountValue {
            key,
            value,
            currency,
            ..
        } => {
            info!("{}", value_line(&key, &value, &currency));
            details.values.push(AccountValueLine { key, value, currency });
            false
        }
        GatewayEvent::PortfolioValue(item) => {
            info!("{}", portfolio_line(&item));
            details.portfolio.push(item);
            false
        }
        GatewayEvent::AccountDownloadEnd { .. } => true,
        GatewayEvent::Error { req_id, code, message } => {
            log_api_error(req_id, code, &message);
            false
        }
        _ => false,
    })
    .await;
    info!("{RULE}");
    if !details.portfolio.is_empty() {
        info!(
            positions = details.portfolio.len(),
            unrealized_pnl = details.unrealized_pnl(),
            "Portfolio total"
        );
    }

    gateway.cancel_account_updates().await?;
    finish(outcome, "account download")?;
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tws_ib::{RecordedRequest, RecordingGateway};

    #[test]
    fn line_layout() {
        assert_eq!(summary_line("NetLiquidation", "1000.5", "USD"), format!("NetLiquidation{}\t1000.5 USD", " ".repeat(11)));
        assert_eq!(value_line("CashBalance", "12", "USD"), format!("CashBalance{}\t{}12 USD", " ".repeat(19), " ".repeat(8)));
    }

    #[tokio::test]
    async fn summary_stops_at_its_own_end_marker() {
        let (gateway, mut events) = RecordingGateway::with_responder(|request| match request {
            RecordedRequest::AccountSummary { req_id } => vec![
                GatewayEvent::AccountSummaryEnd { req_id: req_id + 1 },
                GatewayEvent::AccountSummary {
                    req_id: *req_id,
                    account: "DU123".into(),
                    tag: "NetLiquidation".into(),
                    value: "100000".into(),
                    currency: "USD".into(),
                },
                GatewayEvent::AccountSummaryEnd { req_id: *req_id },
            ],
            _ => Vec::new(),
        });

        let lines = account_summary(&gateway, &mut events, 9, Duration::from_secs(1)).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tag, "NetLiquidation");
    }

    #[tokio::test]
    async fn details_collect_values_and_positions() {
        let (gateway, mut events) = RecordingGateway::with_responder(|request| match request {
            RecordedRequest::AccountUpdates { account } => vec![
                GatewayEvent::AccountValue {
                    key: "CashBalance".into(),
                    value: "5000".into(),
                    currency: "USD".into(),
                    account: account.clone(),
                },
                GatewayEvent::PortfolioValue(PortfolioItem {
                    con_id: 1,
                    symbol: "CL".into(),
                    strike: 50.0,
                    position: 1.0,
                    market_price: 1.23456,
                    market_value: 1234.56,
                    average_cost: 1000.0,
                    unrealized_pnl: 234.56,
                    realized_pnl: 0.0,
                    account: account.clone(),
                }),
                GatewayEvent::AccountDownloadEnd { account: account.clone() },
            ],
            _ => Vec::new(),
        });

        let details = account_details(&gateway, &mut events, "DU123", Duration::from_secs(1)).await.unwrap();
        assert_eq!(details.values.len(), 1);
        assert_eq!(details.unrealized_pnl(), 234.56);
        assert_eq!(gateway.requests().last(), Some(&RecordedRequest::CancelAccountUpdates));
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let (closed, mut events) = RecordingGateway::new();
        drop(closed);
        let (gateway, _other_events) = RecordingGateway::new();

        let result = account_summary(&gateway, &mut events, 1, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
