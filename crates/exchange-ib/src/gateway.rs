//! The request side of the brokerage API.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ContractSpec, OrderTicket};

/// Requests a tool can issue. Responses come back as
/// [`GatewayEvent`](crate::events::GatewayEvent)s on the channel handed out
/// when the gateway was created, tagged with the caller's request id.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn request_contract_details(&self, req_id: i32, contract: &ContractSpec) -> Result<()>;

    /// Market data for `contract`; with `snapshot` the stream ends after one
    /// round of ticks.
    async fn request_market_data(
        &self,
        req_id: i32,
        contract: &ContractSpec,
        snapshot: bool,
    ) -> Result<()>;

    async fn cancel_market_data(&self, req_id: i32) -> Result<()>;

    async fn request_account_updates(&self, account: &str) -> Result<()>;

    async fn cancel_account_updates(&self) -> Result<()>;

    async fn request_account_summary(&self, req_id: i32) -> Result<()>;

    /// Next order id TWS will accept.
    async fn next_order_id(&self) -> Result<i32>;

    /// Places `order`, or modifies it when its id was placed before.
    async fn place_order(&self, contract: &ContractSpec, order: &OrderTicket) -> Result<()>;

    async fn cancel_order(&self, order_id: i32) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}
