//! In-process gateway that records requests instead of talking to TWS.
//!
//! Replies are produced by an optional responder closure, or pushed by hand
//! with [`RecordingGateway::emit`]. Used to drive the tools without IB Gateway.

use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{EventReceiver, EventSender, GatewayEvent};
use crate::gateway::Gateway;
use crate::types::{ContractSpec, OrderTicket};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    ContractDetails { req_id: i32, contract: ContractSpec },
    MarketData { req_id: i32, contract: ContractSpec, snapshot: bool },
    CancelMarketData { req_id: i32 },
    AccountUpdates { account: String },
    CancelAccountUpdates,
    AccountSummary { req_id: i32 },
    PlaceOrder { contract: ContractSpec, order: OrderTicket },
    CancelOrder { order_id: i32 },
    Disconnect,
}

type Responder = Box<dyn Fn(&RecordedRequest) -> Vec<GatewayEvent> + Send + Sync>;

pub struct RecordingGateway {
    requests: Mutex<Vec<RecordedRequest>>,
    events: EventSender,
    responder: Option<Responder>,
    next_order_id: AtomicI32,
}

impl RecordingGateway {
    pub fn new() -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let gateway = Self {
            requests: Mutex::new(Vec::new()),
            events,
            responder: None,
            next_order_id: AtomicI32::new(1),
        };
        (gateway, receiver)
    }

    /// Answers every request with the events `responder` returns for it.
    pub fn with_responder<F>(responder: F) -> (Self, EventReceiver)
    where
        F: Fn(&RecordedRequest) -> Vec<GatewayEvent> + Send + Sync + 'static,
    {
        let (mut gateway, receiver) = Self::new();
        gateway.responder = Some(Box::new(responder));
        (gateway, receiver)
    }

    pub fn with_first_order_id(self, order_id: i32) -> Self {
        self.next_order_id.store(order_id, Ordering::SeqCst);
        self
    }

    /// Delivers a callback as if TWS had sent it.
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.events.send(event);
    }

    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn record(&self, request: RecordedRequest) {
        debug!(?request, "Recorded gateway request");
        let replies = self
            .responder
            .as_ref()
            .map(|respond| respond(&request))
            .unwrap_or_default();
        self.requests.lock().push(request);
        for reply in replies {
            self.emit(reply);
        }
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn request_contract_details(&self, req_id: i32, contract: &ContractSpec) -> Result<()> {
        self.record(RecordedRequest::ContractDetails {
            req_id,
            contract: contract.clone(),
        });
        Ok(())
    }

    async fn request_market_data(
        &self,
        req_id: i32,
        contract: &ContractSpec,
        snapshot: bool,
    ) -> Result<()> {
        self.record(RecordedRequest::MarketData {
            req_id,
            contract: contract.clone(),
            snapshot,
        });
        Ok(())
    }

    async fn cancel_market_data(&self, req_id: i32) -> Result<()> {
        self.record(RecordedRequest::CancelMarketData { req_id });
        Ok(())
    }

    async fn request_account_updates(&self, account: &str) -> Result<()> {
        self.record(RecordedRequest::AccountUpdates {
            account: account.to_string(),
        });
        Ok(())
    }

    async fn cancel_account_updates(&self) -> Result<()> {
        self.record(RecordedRequest::CancelAccountUpdates);
        Ok(())
    }

    async fn request_account_summary(&self, req_id: i32) -> Result<()> {
        self.record(RecordedRequest::AccountSummary { req_id });
        Ok(())
    }

    async fn next_order_id(&self) -> Result<i32> {
        Ok(self.next_order_id.load(Ordering::SeqCst))
    }

    async fn place_order(&self, contract: &ContractSpec, order: &OrderTicket) -> Result<()> {
        self.next_order_id
            .fetch_max(order.order_id + 1, Ordering::SeqCst);
        self.record(RecordedRequest::PlaceOrder {
            contract: contract.clone(),
            order: order.clone(),
        });
        Ok(())
    }

    async fn cancel_order(&self, order_id: i32) -> Result<()> {
        self.record(RecordedRequest::CancelOrder { order_id });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(RecordedRequest::Disconnect);
        Ok(())
    }
}
