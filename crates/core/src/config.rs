use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tws: TwsConfig,
    pub poll: PollConfig,
    pub scraper: ScraperConfig,
    pub snapshot: SnapshotConfig,
    pub trader: TraderConfig,
    pub store: StoreConfig,
}

/// TWS / IB Gateway connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwsConfig {
    /// Use 127.0.0.1 rather than localhost, TWS may refuse IPv6.
    pub host: String,
    /// 4001 = gateway live, 4002 = gateway paper, 7496/7497 = TWS.
    pub port: u16,
    pub client_id: i32,
}

impl Default for TwsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4001,
            client_id: 12,
        }
    }
}

/// Timing of request issuance and the convergence poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between two completeness checks.
    pub interval_ms: u64,
    /// Sleep between two consecutive requests (TWS allows ~50 msg/s).
    pub pacing_ms: u64,
    /// Hard cap on any wait for callbacks.
    pub max_wait_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            pacing_ms: 25,
            max_wait_secs: 300,
        }
    }
}

/// Underlying contract an option chain is built on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderlyingConfig {
    pub symbol: String,
    pub sec_type: String,
    pub exchange: String,
    pub currency: String,
    pub trading_class: String,
}

impl Default for UnderlyingConfig {
    fn default() -> Self {
        Self {
            symbol: "CL".to_string(),
            sec_type: "FOP".to_string(),
            exchange: "NYMEX".to_string(),
            currency: "USD".to_string(),
            trading_class: "LO".to_string(),
        }
    }
}

/// Contract-ID scraper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub underlying: UnderlyingConfig,
    pub price_from: Decimal,
    pub price_to: Decimal,
    pub strike_step: Decimal,
    /// First month relative to the current one.
    pub rel_start_month: u32,
    pub months: u32,
    /// First request id handed out.
    pub first_request_id: i32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            underlying: UnderlyingConfig::default(),
            price_from: Decimal::from(40),
            price_to: Decimal::from(70),
            strike_step: Decimal::new(5, 1),
            rel_start_month: 1,
            months: 3,
            first_request_id: 1,
        }
    }
}

/// Market snapshot scraper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub underlying: UnderlyingConfig,
    /// Account whose positions enrich the snapshot.
    pub account: String,
    pub price_from: Decimal,
    pub price_to: Decimal,
    pub price_step: Decimal,
    pub rel_start_month: u32,
    pub rel_step_month: u32,
    pub months: u32,
    /// Contract multiplier, average cost is divided by it.
    pub multiplier: Decimal,
    pub first_request_id: i32,
    /// Default CSV output when `--csv` is given without a path.
    pub csv_path: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            underlying: UnderlyingConfig::default(),
            account: String::new(),
            price_from: Decimal::from(40),
            price_to: Decimal::from(70),
            price_step: Decimal::new(5, 1),
            rel_start_month: 1,
            rel_step_month: 1,
            months: 3,
            multiplier: Decimal::from(1000),
            first_request_id: 1,
            csv_path: "./data/out.csv".to_string(),
        }
    }
}

/// News trader instrument and bracket geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub symbol: String,
    pub expiry: String,
    pub sec_type: String,
    pub exchange: String,
    pub currency: String,
    pub entry_spread: Decimal,
    pub target_spread: Decimal,
    pub trail_spread: Decimal,
    /// Reprice the bracket once the market moved this much.
    pub delta_adjust: Decimal,
    pub adjust_interval_ms: u64,
    pub quantity: u32,
    /// Request id of the streaming market data subscription.
    pub market_data_request_id: i32,
    /// Place the bracket as soon as the first last price arrives.
    pub arm_on_start: bool,
}

impl TraderConfig {
    pub fn adjust_interval(&self) -> Duration {
        Duration::from_millis(self.adjust_interval_ms)
    }
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            symbol: "CL".to_string(),
            expiry: String::new(),
            sec_type: "FUT".to_string(),
            exchange: "NYMEX".to_string(),
            currency: "USD".to_string(),
            entry_spread: Decimal::new(5, 2),
            target_spread: Decimal::new(2, 1),
            trail_spread: Decimal::new(2, 1),
            delta_adjust: Decimal::new(2, 2),
            adjust_interval_ms: 500,
            quantity: 1,
            market_data_request_id: 3,
            arm_on_start: true,
        }
    }
}

/// Key-value store backing the exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub instruments_table: String,
    pub market_data_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/tws_tools".to_string(),
            max_connections: 5,
            instruments_table: "instruments".to_string(),
            market_data_table: "mktData".to_string(),
        }
    }
}
