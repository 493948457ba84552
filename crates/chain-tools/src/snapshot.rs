//! Market snapshot scraper.
//!
//! Requests a one-shot market data snapshot plus contract details for every
//! leg of an option chain, waits until the callbacks stop improving the
//! picture, then reshapes the result into a [`Table`] enriched with the
//! account's positions. The table can be written to CSV and to the key-value
//! store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use tws_core::{
    poll_until_converged, Completion, PollConfig, PollOutcome, PollSettings, RequestTable,
    SnapshotConfig, Termination,
};
use tws_data::{dtg, maybe_number, number, snapshot_item, ItemKey, KeyValueStore, Table};
use tws_ib::events::{log_api_error, MODEL_OPTION_TICK};
use tws_ib::{ContractSpec, EventReceiver, Gateway, GatewayEvent, OptionRight, TickField};

use crate::account::{download_account, AccountSnapshot};
use crate::chain::{contract_months, instrument_string, strike_chain};

pub const COLUMNS: [&str; 19] = [
    "id",
    "Financial Instrument",
    "Strike",
    "Side",
    "Expiry",
    "conid",
    "Underlying Price",
    "Bid",
    "Mid",
    "Ask",
    "Spread",
    "Position",
    "Avg Price",
    "Implied Vol. %",
    "Delta",
    "Gamma",
    "Vega",
    "Theta",
    "Days to Last Trading Day",
];

/// Market state of one option leg.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub contract: ContractSpec,
    pub instrument: String,
    pub con_id: Option<i64>,
    /// `YYYYMMDD`
    pub last_trade_date: Option<String>,
    pub underlying_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub implied_vol: String,
}

impl SnapshotRecord {
    pub fn new(contract: ContractSpec, instrument: String) -> Self {
        Self {
            contract,
            instrument,
            con_id: None,
            last_trade_date: None,
            underlying_price: None,
            bid: None,
            ask: None,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            implied_vol: "NA".to_string(),
        }
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.ask? + self.bid?) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        Some((self.ask? - self.bid?).abs())
    }

    /// Whole days from `now` to the last trading day, rounded down.
    pub fn days_to_last_trade(&self, now: NaiveDateTime) -> Option<i64> {
        let date = NaiveDate::parse_from_str(self.last_trade_date.as_deref()?, "%Y%m%d").ok()?;
        let seconds = (date.and_hms_opt(0, 0, 0)? - now).num_seconds();
        Some(seconds.div_euclid(86_400))
    }
}

impl Completion for SnapshotRecord {
    /// A quote on either side and the model delta.
    fn is_complete(&self) -> bool {
        (self.bid.is_some() || self.ask.is_some()) && self.delta.is_some()
    }
}

/// Percent label; whole values keep one decimal (`25.0%`).
fn implied_vol_label(iv: Option<f64>) -> String {
    let Some(iv) = iv else {
        return "NA".to_string();
    };
    let percent = iv * 100.0;
    if percent.is_finite() && percent.fract() == 0.0 {
        format!("{percent:.1}%")
    } else {
        format!("{percent}%")
    }
}

/// Folds one market data or contract details callback into the table.
pub fn apply_event(table: &mut RequestTable<SnapshotRecord>, event: GatewayEvent) {
    match event {
        GatewayEvent::TickPrice { req_id, field, price } => {
            let Some(record) = table.get_mut(req_id) else {
                error!(req_id, "Unknown req id in price tick");
                return;
            };
            match field {
                TickField::Bid => record.bid = Some(price),
                TickField::Ask => record.ask = Some(price),
                _ => {}
            }
        }
        GatewayEvent::OptionComputation {
            req_id,
            tick_type,
            computation,
        } => {
            let Some(record) = table.get_mut(req_id) else {
                error!(req_id, "Unknown req id in option computation tick");
                return;
            };
            match computation.underlying_price {
                Some(price) => record.underlying_price = Some(price),
                None => debug!(instrument = %record.instrument, "No underlying price"),
            }
            if tick_type == MODEL_OPTION_TICK {
                record.delta = computation.delta;
                record.gamma = computation.gamma;
                record.theta = computation.theta;
                record.vega = computation.vega;
                record.implied_vol = implied_vol_label(computation.implied_volatility);
            }
        }
        GatewayEvent::ContractDetails {
            req_id,
            con_id,
            last_trade_date,
        } => {
            let Some(record) = table.get_mut(req_id) else {
                error!(req_id, "Unknown req id in contract details");
                return;
            };
            record.con_id = Some(con_id);
            record.last_trade_date = Some(last_trade_date);
        }
        GatewayEvent::Error {
            req_id,
            code,
            message,
        } => log_api_error(req_id, code, &message),
        _ => {}
    }
}

pub struct SnapshotScraper {
    config: SnapshotConfig,
    poll: PollConfig,
    underlying: ContractSpec,
    months: Vec<String>,
    price_from: Decimal,
    price_to: Decimal,
    account: AccountSnapshot,
    table: RequestTable<SnapshotRecord>,
}

impl SnapshotScraper {
    pub fn new(config: SnapshotConfig, poll: PollConfig, today: NaiveDate) -> Self {
        let u = &config.underlying;
        let underlying = ContractSpec::new(&u.symbol, &u.sec_type, &u.exchange, &u.currency)
            .with_trading_class(&u.trading_class);
        let months = contract_months(
            today,
            config.rel_start_month,
            config.months,
            config.rel_step_month,
        );
        Self {
            underlying,
            months,
            price_from: config.price_from,
            price_to: config.price_to,
            account: AccountSnapshot::default(),
            table: RequestTable::new(config.first_request_id),
            config,
            poll,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.underlying.symbol
    }

    pub fn records(&self) -> &RequestTable<SnapshotRecord> {
        &self.table
    }

    pub fn price_range(&self) -> (Decimal, Decimal) {
        (self.price_from, self.price_to)
    }

    /// Downloads held positions and widens the strike range to cover them.
    ///
    /// # Errors
    /// Returns an error if the account download fails.
    pub async fn load_account(&mut self, gateway: &dyn Gateway, events: &mut EventReceiver) -> Result<()> {
        if self.config.account.is_empty() {
            info!("No account configured, skipping positions");
            return Ok(());
        }
        let account = download_account(
            gateway,
            events,
            &self.config.account,
            &self.underlying.symbol,
            self.poll.max_wait(),
        )
        .await?;
        self.set_account(account);
        Ok(())
    }

    pub fn set_account(&mut self, account: AccountSnapshot) {
        if let Some((lo, hi)) = account.strike_range() {
            if let Some(lo) = Decimal::from_f64(lo) {
                self.price_from = self.price_from.min(lo);
            }
            if let Some(hi) = Decimal::from_f64(hi) {
                self.price_to = self.price_to.max(hi);
            }
        }
        debug!(from = %self.price_from, to = %self.price_to, "Price range");
        self.account = account;
    }

    /// Issues a snapshot and a contract details request per leg, both under
    /// the leg's id.
    ///
    /// # Errors
    /// Returns an error if the strike range is invalid or a request fails.
    pub async fn request(&mut self, gateway: &dyn Gateway) -> Result<usize> {
        info!("Creating instruments and requesting data");
        let strikes = strike_chain(self.price_from, self.price_to, self.config.price_step)?;
        for month in &self.months {
            info!(month = %month, "Requesting month");
            for strike in &strikes {
                for right in [OptionRight::Call, OptionRight::Put] {
                    let contract = self.underlying.with_option(month, *strike, right);
                    let instrument = instrument_string(&self.underlying, month, *strike, right)?;
                    let req_id = self.table.issue(SnapshotRecord::new(contract.clone(), instrument));

                    tokio::time::sleep(self.poll.pacing()).await;
                    gateway.request_market_data(req_id, &contract, true).await?;
                    gateway.request_contract_details(req_id, &contract).await?;
                }
            }
        }
        Ok(self.table.len())
    }

    /// Polls until every leg is complete or two polls in a row report the
    /// same number of missing legs.
    pub async fn wait(&mut self, events: &mut EventReceiver) -> PollOutcome {
        info!("Waiting for all market data to arrive");
        let settings = PollSettings {
            interval: self.poll.interval(),
            max_wait: self.poll.max_wait(),
            termination: Termination::Stagnation,
        };
        let outcome = poll_until_converged(&mut self.table, events, &settings, apply_event).await;
        info!(missing = outcome.missing(), "All available data has been received, proceeding");
        outcome
    }

    /// Fills contract ids that did not arrive from the instruments table.
    ///
    /// # Errors
    /// Returns an error if a store lookup fails.
    pub async fn lookup_contract_ids(&mut self, store: &dyn KeyValueStore, table: &str) -> Result<usize> {
        info!(table, "Getting contract ids from the store");
        let mut found = 0;
        for (_, record) in self.table.iter_mut().filter(|(_, r)| r.con_id.is_none()) {
            let item = store
                .get_item(table, &ItemKey::new(record.instrument.as_str()))
                .await
                .with_context(|| format!("Failed to look up {}", record.instrument))?;
            if let Some(con_id) = item.as_ref().and_then(|i| i.get("conid")).and_then(Value::as_i64) {
                record.con_id = Some(con_id);
                found += 1;
            }
        }
        debug!(found, "Contract ids filled from the store");
        Ok(found)
    }

    /// Reshapes the records into the export table.
    ///
    /// # Errors
    /// Returns an error if the multiplier is zero.
    pub fn build_table(&self, now: NaiveDateTime) -> Result<Table> {
        let multiplier = self
            .config
            .multiplier
            .to_f64()
            .filter(|m| *m != 0.0)
            .context("Contract multiplier must be non-zero")?;

        let mut table = Table::new(COLUMNS);
        for (id, r) in self.table.iter() {
            let held = r.con_id.and_then(|c| self.account.positions.get(&c));
            let (position, avg_price) =
                held.map_or((0.0, 0.0), |h| (h.position, h.average_cost / multiplier));

            table.push_row(vec![
                json!(id),
                json!(r.instrument),
                maybe_number(r.contract.strike.and_then(|s| s.to_f64())),
                json!(r.contract.right.map(|side| side.to_string())),
                json!(r.contract.expiry),
                json!(r.con_id),
                maybe_number(r.underlying_price),
                maybe_number(r.bid),
                maybe_number(r.mid()),
                maybe_number(r.ask),
                maybe_number(r.spread()),
                number(position),
                number(avg_price),
                json!(r.implied_vol),
                maybe_number(r.delta),
                maybe_number(r.gamma),
                maybe_number(r.vega),
                maybe_number(r.theta),
                json!(r.days_to_last_trade(now)),
            ])?;
        }
        info!(rows = table.len(), held = self.account.positions.len(), "Snapshot table ready");
        Ok(table)
    }

    /// Puts the table as one item keyed by symbol and date-time group. Failures
    /// are logged and reported as `false`.
    pub async fn export_store(
        &self,
        store: &dyn KeyValueStore,
        table_name: &str,
        table: &Table,
        stamp: &str,
    ) -> bool {
        info!(table = table_name, "Exporting market data snapshot");
        let result = async {
            let item = snapshot_item(self.symbol(), stamp, table)?;
            store.put_item(table_name, &item).await?;
            anyhow::Ok(())
        }
        .await;
        match result {
            Ok(()) => {
                debug!("Data export successful");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to export snapshot");
                false
            }
        }
    }
}

/// Where a finished snapshot goes.
#[derive(Default)]
pub struct SnapshotSinks<'a> {
    pub store: Option<&'a dyn KeyValueStore>,
    pub instruments_table: String,
    pub market_data_table: String,
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotReport {
    pub requested: usize,
    pub outcome: PollOutcome,
    pub table: Table,
    pub csv: Option<PathBuf>,
    pub exported: Option<bool>,
}

/// Account → requests → wait → table → exports.
///
/// # Errors
/// Returns an error if a request, the lookup or the CSV write fails.
pub async fn run(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    mut scraper: SnapshotScraper,
    sinks: SnapshotSinks<'_>,
) -> Result<SnapshotReport> {
    scraper.load_account(gateway, events).await?;
    let requested = scraper.request(gateway).await?;
    let outcome = scraper.wait(events).await;
    if outcome.missing() > 0 {
        warn!(missing = outcome.missing(), "Snapshot is incomplete");
    }

    if let Some(store) = sinks.store {
        scraper.lookup_contract_ids(store, &sinks.instruments_table).await?;
    }
    let now = Local::now();
    let table = scraper.build_table(now.naive_local())?;

    if let Some(path) = &sinks.csv {
        write_csv(&table, path)?;
    }
    let exported = match sinks.store {
        Some(store) => Some(
            scraper
                .export_store(store, &sinks.market_data_table, &table, &dtg(&now))
                .await,
        ),
        None => None,
    };

    Ok(SnapshotReport {
        requested,
        outcome,
        table,
        csv: sinks.csv,
        exported,
    })
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    table.write_csv_file(path)?;
    info!(path = %path.display(), rows = table.len(), "Snapshot written");
    Ok(())
}
