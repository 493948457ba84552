//! Callback model: everything TWS sends back is a [`GatewayEvent`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{OptionComputation, PortfolioItem};

pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Price tick fields, numbered as in the TWS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickField {
    Bid,
    Ask,
    Last,
    Other(i32),
}

impl TickField {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Bid,
            2 => Self::Ask,
            4 => Self::Last,
            other => Self::Other(other),
        }
    }
}

/// Tick id of the model option computation (greeks from the IB pricing model).
pub const MODEL_OPTION_TICK: i32 = 13;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: i32,
    pub status: String,
    pub filled: f64,
    pub remaining: f64,
    pub avg_fill_price: f64,
    pub parent_id: i32,
    pub last_fill_price: f64,
}

impl OrderStatusUpdate {
    pub fn is_filled(&self) -> bool {
        self.status == "Filled"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayEvent {
    ContractDetails {
        req_id: i32,
        con_id: i64,
        /// As reported by TWS, `YYYYMMDD` for expiring contracts.
        last_trade_date: String,
    },
    ContractDetailsEnd {
        req_id: i32,
    },
    TickPrice {
        req_id: i32,
        field: TickField,
        price: f64,
    },
    OptionComputation {
        req_id: i32,
        tick_type: i32,
        computation: OptionComputation,
    },
    SnapshotEnd {
        req_id: i32,
    },
    AccountValue {
        key: String,
        value: String,
        currency: String,
        account: String,
    },
    PortfolioValue(PortfolioItem),
    AccountDownloadEnd {
        account: String,
    },
    AccountSummary {
        req_id: i32,
        account: String,
        tag: String,
        value: String,
        currency: String,
    },
    AccountSummaryEnd {
        req_id: i32,
    },
    OrderStatus(OrderStatusUpdate),
    Execution {
        order_id: i32,
        price: f64,
        shares: f64,
    },
    Error {
        req_id: Option<i32>,
        code: i32,
        message: String,
    },
}

impl GatewayEvent {
    /// Request id the event answers, for request-scoped events.
    pub fn req_id(&self) -> Option<i32> {
        match self {
            Self::ContractDetails { req_id, .. }
            | Self::ContractDetailsEnd { req_id }
            | Self::TickPrice { req_id, .. }
            | Self::OptionComputation { req_id, .. }
            | Self::SnapshotEnd { req_id }
            | Self::AccountSummary { req_id, .. }
            | Self::AccountSummaryEnd { req_id } => Some(*req_id),
            Self::Error { req_id, .. } => *req_id,
            _ => None,
        }
    }
}

/// Logs an API error the way every tool does: print and carry on.
pub fn log_api_error(req_id: Option<i32>, code: i32, message: &str) {
    // 2104/2106/2158: farm connection notices, not failures.
    if matches!(code, 2104 | 2106 | 2107 | 2108 | 2158) {
        tracing::debug!(?req_id, code, message, "TWS notice");
    } else {
        tracing::error!(?req_id, code, message, "TWS error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_codes() {
        assert_eq!(TickField::from_code(1), TickField::Bid);
        assert_eq!(TickField::from_code(2), TickField::Ask);
        assert_eq!(TickField::from_code(4), TickField::Last);
        assert_eq!(TickField::from_code(9), TickField::Other(9));
    }

    #[test]
    fn request_scoped_events_expose_their_id() {
        let e = GatewayEvent::TickPrice { req_id: 7, field: TickField::Bid, price: 1.0 };
        assert_eq!(e.req_id(), Some(7));
        let e = GatewayEvent::AccountDownloadEnd { account: "DU1".into() };
        assert_eq!(e.req_id(), None);
    }
}
