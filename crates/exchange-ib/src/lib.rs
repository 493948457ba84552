//! Interactive Brokers gateway for the TWS tools.
//!
//! [`Gateway`] is the request side of the brokerage API, callbacks arrive as
//! [`GatewayEvent`]s on a channel. [`IBClient`] implements it on top of the
//! `ibapi` crate, [`RecordingGateway`] implements it in-process.

pub mod account;
pub mod client;
pub mod error;
pub mod events;
pub mod execution;
pub mod gateway;
pub mod market_data;
pub mod recording;
pub mod types;

pub use client::{IBClient, IBConfig};
pub use error::GatewayError;
pub use events::{EventReceiver, EventSender, GatewayEvent, OrderStatusUpdate, TickField};
pub use gateway::Gateway;
pub use recording::{RecordedRequest, RecordingGateway};
pub use types::{
    ContractSpec, OptionComputation, OptionGreeks, OptionRight, OrderKind, OrderSide, OrderTicket,
    PortfolioItem,
};
