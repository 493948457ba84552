//! Contract ID scraper: resolves the conId of every leg of an option chain
//! and stores them keyed by instrument string.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use tws_core::{
    poll_until_converged, Completion, PollConfig, PollOutcome, PollSettings, RequestTable,
    ScraperConfig, Termination,
};
use tws_data::{Item, ItemKey, KeyValueStore};
use tws_ib::events::log_api_error;
use tws_ib::{ContractSpec, EventReceiver, Gateway, GatewayEvent, OptionRight};

use crate::chain::{contract_months, instrument_string, strike_chain};

/// One contract-details request.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRecord {
    pub contract: ContractSpec,
    pub con_id: Option<i64>,
    pub contract_month: Option<String>,
    pub instrument: Option<String>,
}

impl Completion for ContractRecord {
    fn is_complete(&self) -> bool {
        self.con_id.is_some()
    }
}

/// Folds a contract-details callback into the table.
pub fn apply_event(table: &mut RequestTable<ContractRecord>, event: GatewayEvent) {
    match event {
        GatewayEvent::ContractDetails {
            req_id,
            con_id,
            last_trade_date,
        } => match table.get_mut(req_id) {
            Some(record) => {
                record.con_id = Some(con_id);
                record.contract_month = Some(last_trade_date);
            }
            None => error!(req_id, "Unknown req id in contract details"),
        },
        GatewayEvent::Error {
            req_id,
            code,
            message,
        } => log_api_error(req_id, code, &message),
        _ => {}
    }
}

pub struct ContractIdScraper {
    underlying: ContractSpec,
    strikes: Vec<Decimal>,
    months: Vec<String>,
    poll: PollConfig,
    table: RequestTable<ContractRecord>,
}

impl ContractIdScraper {
    /// # Errors
    /// Returns an error if the strike range is invalid.
    pub fn new(config: &ScraperConfig, poll: PollConfig, today: NaiveDate) -> Result<Self> {
        let u = &config.underlying;
        let underlying = ContractSpec::new(&u.symbol, &u.sec_type, &u.exchange, &u.currency)
            .with_trading_class(&u.trading_class);
        Ok(Self {
            underlying,
            strikes: strike_chain(config.price_from, config.price_to, config.strike_step)?,
            months: contract_months(today, config.rel_start_month, config.months, 1),
            poll,
            table: RequestTable::new(config.first_request_id),
        })
    }

    pub fn records(&self) -> &RequestTable<ContractRecord> {
        &self.table
    }

    /// Issues one contract-details request per month, strike and right.
    ///
    /// # Errors
    /// Returns an error if the gateway rejects a request.
    pub async fn request(&mut self, gateway: &dyn Gateway) -> Result<usize> {
        info!(
            months = self.months.len(),
            strikes = self.strikes.len(),
            "Creating option chain and requesting details"
        );
        for month in &self.months {
            info!(month = %month, "Requesting month");
            for strike in &self.strikes {
                for right in [OptionRight::Put, OptionRight::Call] {
                    let contract = self.underlying.with_option(month, *strike, right);
                    let req_id = self.table.issue(ContractRecord {
                        contract: contract.clone(),
                        con_id: None,
                        contract_month: None,
                        instrument: None,
                    });
                    gateway.request_contract_details(req_id, &contract).await?;
                    tokio::time::sleep(self.poll.pacing()).await;
                }
            }
        }
        Ok(self.table.len())
    }

    /// Waits until every conId arrived or the hard cap is hit.
    pub async fn wait(&mut self, events: &mut EventReceiver) -> PollOutcome {
        info!("Waiting for all contract details to arrive");
        let settings = PollSettings {
            interval: self.poll.interval(),
            max_wait: self.poll.max_wait(),
            termination: Termination::AllFilled,
        };
        let outcome = poll_until_converged(&mut self.table, events, &settings, apply_event).await;
        if outcome.is_complete() {
            info!("All data received, proceeding");
        }
        outcome
    }

    /// Computes the instrument string of every record.
    ///
    /// # Errors
    /// Returns an error if a record has an unparsable expiry.
    pub fn postprocess(&mut self) -> Result<()> {
        for (_, record) in self.table.iter_mut() {
            let (Some(strike), Some(right)) = (record.contract.strike, record.contract.right) else {
                continue;
            };
            record.instrument = Some(instrument_string(
                &record.contract,
                &record.contract.expiry,
                strike,
                right,
            )?);
        }
        Ok(())
    }

    /// `instString → conid` items for every resolved record.
    pub fn items(&self) -> Vec<Item> {
        self.table
            .iter()
            .filter_map(|(_, r)| match (&r.instrument, r.con_id) {
                (Some(inst), Some(con_id)) => {
                    Some(Item::new(ItemKey::new(inst.as_str())).with("conid", con_id))
                }
                _ => None,
            })
            .collect()
    }

    /// # Errors
    /// Returns an error if the batch write fails.
    pub async fn write(&self, store: &dyn KeyValueStore, table: &str) -> Result<usize> {
        info!(table, "Exporting contract ids");
        let items = self.items();
        let skipped = self.table.len() - items.len();
        if skipped > 0 {
            warn!(skipped, "Records without a contract id are not exported");
        }
        let written = store.batch_put(table, &items).await?;
        info!(written, "Export finished");
        Ok(written)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    pub requested: usize,
    pub outcome: PollOutcome,
    pub written: usize,
}

/// Request → wait → postprocess → export.
///
/// # Errors
/// Returns an error if a request or the export fails.
pub async fn run(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    store: Option<&dyn KeyValueStore>,
    table: &str,
    mut scraper: ContractIdScraper,
) -> Result<ScrapeReport> {
    let requested = scraper.request(gateway).await?;
    let outcome = scraper.wait(events).await;
    scraper.postprocess()?;
    let written = match store {
        Some(store) => scraper.write(store, table).await?,
        None => 0,
    };
    Ok(ScrapeReport {
        requested,
        outcome,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tws_data::MemoryStore;
    use tws_ib::{RecordedRequest, RecordingGateway};

    fn config() -> ScraperConfig {
        ScraperConfig {
            price_from: dec!(40),
            price_to: dec!(41),
            strike_step: dec!(0.5),
            rel_start_month: 1,
            months: 1,
            first_request_id: 1000,
            ..ScraperConfig::default()
        }
    }

    fn poll() -> PollConfig {
        PollConfig {
            interval_ms: 5,
            pacing_ms: 0,
            max_wait_secs: 1,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 1, 10).unwrap()
    }

    #[tokio::test]
    async fn resolves_every_leg_and_exports() {
        let (gateway, mut events) = RecordingGateway::with_responder(|request| match request {
            RecordedRequest::ContractDetails { req_id, contract } => vec![
                GatewayEvent::ContractDetails {
                    req_id: *req_id,
                    con_id: i64::from(*req_id) * 10,
                    last_trade_date: contract.expiry.clone(),
                },
                GatewayEvent::ContractDetailsEnd { req_id: *req_id },
            ],
            _ => Vec::new(),
        });
        let store = MemoryStore::new();
        let scraper = ContractIdScraper::new(&config(), poll(), today()).unwrap();

        let report = run(&gateway, &mut events, Some(&store), "instruments", scraper)
            .await
            .unwrap();

        assert_eq!(report.requested, 4);
        assert!(report.outcome.is_complete());
        assert_eq!(report.written, 4);

        let first = store
            .get_item("instruments", &ItemKey::new("CL FOP (LO) Feb'19 40 PUT @NYMEX"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.get("conid"), Some(&json!(10000)));

        let rights: Vec<_> = gateway
            .requests()
            .iter()
            .filter_map(|r| match r {
                RecordedRequest::ContractDetails { contract, .. } => contract.right,
                _ => None,
            })
            .collect();
        assert_eq!(rights[..2], [OptionRight::Put, OptionRight::Call]);
    }

    #[tokio::test]
    async fn unanswered_legs_are_not_exported() {
        let (gateway, mut events) = RecordingGateway::with_responder(|request| match request {
            RecordedRequest::ContractDetails { req_id, .. } if req_id % 2 == 0 => {
                vec![GatewayEvent::ContractDetails {
                    req_id: *req_id,
                    con_id: 1,
                    last_trade_date: "20190215".to_string(),
                }]
            }
            _ => Vec::new(),
        });
        let store = MemoryStore::new();
        let mut poll = poll();
        poll.max_wait_secs = 0;
        let scraper = ContractIdScraper::new(&config(), poll, today()).unwrap();

        let report = run(&gateway, &mut events, Some(&store), "instruments", scraper)
            .await
            .unwrap();

        assert_eq!(report.outcome, PollOutcome::TimedOut { missing: 2 });
        assert_eq!(report.written, 2);
    }
}
