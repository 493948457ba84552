//! Core types for talking to IB.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Options contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Parses the single-letter IB code, case-insensitive.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Long form used in instrument descriptions.
    pub fn long_name(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Instrument descriptor sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub symbol: String,
    /// IB security type code (`STK`, `FUT`, `OPT`, `FOP`, ...).
    pub sec_type: String,
    pub exchange: String,
    pub currency: String,
    pub trading_class: String,
    /// `YYYYMM` or `YYYYMMDD`, empty for non-expiring instruments.
    pub expiry: String,
    pub strike: Option<Decimal>,
    pub right: Option<OptionRight>,
    pub multiplier: Option<String>,
}

impl ContractSpec {
    pub fn new(symbol: &str, sec_type: &str, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            sec_type: sec_type.to_uppercase(),
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            trading_class: String::new(),
            expiry: String::new(),
            strike: None,
            right: None,
            multiplier: None,
        }
    }

    pub fn with_trading_class(mut self, trading_class: &str) -> Self {
        self.trading_class = trading_class.to_string();
        self
    }

    pub fn with_expiry(mut self, expiry: &str) -> Self {
        self.expiry = expiry.to_string();
        self
    }

    /// A single option leg on this template.
    pub fn with_option(&self, expiry: &str, strike: Decimal, right: OptionRight) -> Self {
        Self {
            expiry: expiry.to_string(),
            strike: Some(strike),
            right: Some(right),
            ..self.clone()
        }
    }

    /// Short description for logs (e.g., "CL FOP 202402 40C").
    pub fn display_name(&self) -> String {
        let mut name = format!("{} {}", self.symbol, self.sec_type);
        if !self.expiry.is_empty() {
            name.push(' ');
            name.push_str(&self.expiry);
        }
        if let (Some(strike), Some(right)) = (self.strike, self.right) {
            name.push_str(&format!(" {}{}", strike.normalize(), right));
        }
        name
    }
}

/// Option greeks snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// Option computation tick; TWS leaves any field it cannot compute unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionComputation {
    pub implied_volatility: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub option_price: Option<f64>,
    pub underlying_price: Option<f64>,
}

impl OptionComputation {
    /// All four greeks, if TWS sent them.
    pub fn greeks(&self) -> Option<OptionGreeks> {
        Some(OptionGreeks {
            delta: self.delta?,
            gamma: self.gamma?,
            theta: self.theta?,
            vega: self.vega?,
        })
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Order type with its price parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit { price: Decimal },
    /// Stop-limit: `stop` triggers, `limit` caps the fill.
    StopLimit { limit: Decimal, stop: Decimal },
    /// Trailing stop at `offset` from the market, starting at `trail_stop_price`.
    Trail { trail_stop_price: Decimal, offset: Decimal },
}

impl OrderKind {
    /// IB order type code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Limit { .. } => "LMT",
            Self::StopLimit { .. } => "STP LMT",
            Self::Trail { .. } => "TRAIL",
        }
    }
}

/// An order to place via IB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub order_id: i32,
    pub side: OrderSide,
    pub quantity: u32,
    pub kind: OrderKind,
    pub parent_id: Option<i32>,
    pub oca_group: Option<String>,
    /// Children are held by TWS until an order with `transmit` arrives.
    pub transmit: bool,
}

/// One portfolio line from the account update stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub con_id: i64,
    pub symbol: String,
    pub strike: f64,
    pub position: f64,
    pub market_price: f64,
    pub market_value: f64,
    pub average_cost: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub account: String,
}
