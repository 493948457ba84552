//! IB Gateway/TWS client connection management.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tws_core::TwsConfig;

use crate::events::{EventReceiver, EventSender};
use crate::gateway::Gateway;
use crate::types::{ContractSpec, OrderTicket};

/// IB client configuration.
#[derive(Debug, Clone)]
pub struct IBConfig {
    pub host: String,
    pub port: u16,
    /// Client ID (unique per connection).
    pub client_id: i32,
}

impl Default for IBConfig {
    fn default() -> Self {
        Self::from(&TwsConfig::default())
    }
}

impl From<&TwsConfig> for IBConfig {
    fn from(tws: &TwsConfig) -> Self {
        Self {
            host: tws.host.clone(),
            port: tws.port,
            client_id: tws.client_id,
        }
    }
}

impl IBConfig {
    /// Same endpoint, different client id.
    pub fn with_client_id(mut self, client_id: i32) -> Self {
        self.client_id = client_id;
        self
    }

    /// Connection URL for ibapi crate.
    pub fn connection_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Background work owned by the client, one per live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TaskKey {
    ContractDetails(i32),
    MarketData(i32),
    AccountUpdates,
    AccountSummary(i32),
    Order(i32),
}

/// Live forwarding tasks keyed by what they subscribe to.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTasks {
    tasks: Mutex<HashMap<TaskKey, JoinHandle<()>>>,
}

impl SubscriptionTasks {
    /// Keeps `handle` alive under `key`, aborting whatever ran there before.
    /// Finished tasks are dropped on the way.
    pub(crate) fn track(&self, key: TaskKey, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, h| !h.is_finished());
        if let Some(previous) = tasks.insert(key, handle) {
            previous.abort();
        }
    }

    /// Aborting the task drops its subscription, which cancels it at TWS.
    pub(crate) fn untrack(&self, key: TaskKey) -> bool {
        match self.tasks.lock().remove(&key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn abort_all(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        count
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Wrapper around `ibapi::Client` that turns every response into a
/// [`GatewayEvent`](crate::events::GatewayEvent) tagged with our request id.
pub struct IBClient {
    config: IBConfig,
    pub(crate) client: Arc<ibapi::Client>,
    pub(crate) events: EventSender,
    tasks: SubscriptionTasks,
}

impl IBClient {
    /// Connect to IB Gateway/TWS. The receiver carries every callback.
    pub async fn connect(config: IBConfig) -> Result<(Self, EventReceiver)> {
        let url = config.connection_url();
        info!(url = %url, client_id = config.client_id, "Connecting to IB Gateway");

        let client = ibapi::Client::connect(&url, config.client_id)
            .await
            .context("Failed to connect to IB Gateway")?;

        info!("Connected to IB Gateway");
        let (events, receiver) = mpsc::unbounded_channel();
        let client = Self {
            config,
            client: Arc::new(client),
            events,
            tasks: SubscriptionTasks::default(),
        };
        Ok((client, receiver))
    }

    /// Get a reference to the underlying ibapi client.
    pub fn inner(&self) -> &ibapi::Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &IBConfig {
        &self.config
    }

    pub(crate) fn track(&self, key: TaskKey, handle: JoinHandle<()>) {
        self.tasks.track(key, handle);
    }

    pub(crate) fn untrack(&self, key: TaskKey) -> bool {
        self.tasks.untrack(key)
    }

    fn abort_all(&self) -> usize {
        self.tasks.abort_all()
    }
}

#[async_trait]
impl Gateway for IBClient {
    async fn request_contract_details(&self, req_id: i32, contract: &ContractSpec) -> Result<()> {
        self.spawn_contract_details(req_id, contract)
    }

    async fn request_market_data(
        &self,
        req_id: i32,
        contract: &ContractSpec,
        snapshot: bool,
    ) -> Result<()> {
        self.spawn_market_data(req_id, contract, snapshot)
    }

    async fn cancel_market_data(&self, req_id: i32) -> Result<()> {
        if !self.untrack(TaskKey::MarketData(req_id)) {
            warn!(req_id, "No market data subscription to cancel");
        }
        Ok(())
    }

    async fn request_account_updates(&self, account: &str) -> Result<()> {
        self.spawn_account_updates(account);
        Ok(())
    }

    async fn cancel_account_updates(&self) -> Result<()> {
        self.untrack(TaskKey::AccountUpdates);
        Ok(())
    }

    async fn request_account_summary(&self, req_id: i32) -> Result<()> {
        self.spawn_account_summary(req_id);
        Ok(())
    }

    async fn next_order_id(&self) -> Result<i32> {
        self.client
            .next_valid_order_id()
            .await
            .context("Failed to fetch next valid order id")
    }

    async fn place_order(&self, contract: &ContractSpec, order: &OrderTicket) -> Result<()> {
        self.spawn_order(contract, order)
    }

    async fn cancel_order(&self, order_id: i32) -> Result<()> {
        self.cancel_order_by_id(order_id).await
    }

    async fn disconnect(&self) -> Result<()> {
        let aborted = self.abort_all();
        info!(subscriptions = aborted, "Disconnecting from IB Gateway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn finished_tasks_are_pruned_on_track() {
        let tasks = SubscriptionTasks::default();
        tasks.track(TaskKey::ContractDetails(1), tokio::spawn(async {}));
        tasks.track(TaskKey::ContractDetails(2), tokio::spawn(async {}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        tasks.track(TaskKey::MarketData(3), tokio::spawn(std::future::pending()));
        assert_eq!(tasks.len(), 1);
        assert!(!tasks.untrack(TaskKey::ContractDetails(1)));
        assert!(tasks.untrack(TaskKey::MarketData(3)));
    }

    #[tokio::test]
    async fn retracking_a_key_aborts_the_previous_task() {
        let tasks = SubscriptionTasks::default();
        let first = tokio::spawn(std::future::pending::<()>());
        let first_abort = first.abort_handle();
        tasks.track(TaskKey::MarketData(7), first);
        tasks.track(TaskKey::MarketData(7), tokio::spawn(std::future::pending()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(first_abort.is_finished());
        assert_eq!(tasks.abort_all(), 1);
        assert_eq!(tasks.len(), 0);
    }
}
