//! Trader state machine and its event loop.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tws_core::TraderConfig;
use tws_ib::events::log_api_error;
use tws_ib::{ContractSpec, EventReceiver, Gateway, GatewayEvent, OrderStatusUpdate, TickField};

use crate::bracket::{Bracket, BracketGeometry, Leg};
use crate::types::{Command, Direction, TraderStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    order_id: i32,
    direction: Direction,
    price: Decimal,
}

pub struct NewsTrader {
    config: TraderConfig,
    contract: ContractSpec,
    status: TraderStatus,
    last_price: Option<Decimal>,
    bracket: Bracket,
    entry: Option<OpenEntry>,
    /// Exit fills that arrived ahead of their entry fill, keyed by entry order id.
    early_exits: HashMap<i32, Decimal>,
    /// Entry order ids whose round trip is booked.
    closed: HashSet<i32>,
    pnl: Decimal,
}

impl NewsTrader {
    pub fn new(config: TraderConfig) -> Self {
        let contract = ContractSpec::new(
            &config.symbol,
            &config.sec_type,
            &config.exchange,
            &config.currency,
        )
        .with_expiry(&config.expiry);
        let bracket = Bracket::new(BracketGeometry::from(&config));
        Self {
            config,
            contract,
            status: TraderStatus::Cold,
            last_price: None,
            bracket,
            entry: None,
            early_exits: HashMap::new(),
            closed: HashSet::new(),
            pnl: Decimal::ZERO,
        }
    }

    pub fn status(&self) -> TraderStatus {
        self.status
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    pub fn bracket(&self) -> &Bracket {
        &self.bracket
    }

    /// Realized profit in price points times quantity.
    pub fn pnl(&self) -> Decimal {
        self.pnl
    }

    pub fn contract(&self) -> &ContractSpec {
        &self.contract
    }

    /// Streams market data for the traded instrument.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn subscribe(&self, gateway: &dyn Gateway) -> Result<()> {
        info!(contract = %self.contract.display_name(), "Requesting market data for the instrument");
        gateway
            .request_market_data(self.config.market_data_request_id, &self.contract, false)
            .await
    }

    /// Folds a gateway callback into the trader state.
    pub fn on_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::TickPrice { field, price, .. } => {
                debug!(?field, price, "Price tick");
                if field == TickField::Last {
                    self.on_last_price(price);
                }
            }
            GatewayEvent::OrderStatus(update) => self.on_order_status(&update),
            GatewayEvent::Execution { order_id, price, shares } => {
                debug!(order_id, price, shares, "Execution details");
            }
            GatewayEvent::Error {
                req_id,
                code,
                message,
            } => log_api_error(req_id, code, &message),
            _ => {}
        }
    }

    fn on_last_price(&mut self, price: f64) {
        match Decimal::from_f64(price).filter(|p| *p > Decimal::ZERO) {
            Some(price) => {
                info!(%price, "Updating last price");
                self.last_price = Some(price);
            }
            None => debug!(price, "Ignoring non-positive last price"),
        }
    }

    fn on_order_status(&mut self, update: &OrderStatusUpdate) {
        info!(
            order_id = update.order_id,
            status = %update.status,
            fill_price = update.avg_fill_price,
            "Order status"
        );
        if !update.is_filled() {
            return;
        }
        let Some(leg) = self.bracket.leg_of(update.order_id) else {
            return;
        };
        let Some(price) = Decimal::from_f64(update.avg_fill_price) else {
            warn!(order_id = update.order_id, "Unusable fill price");
            return;
        };

        if leg.is_entry() {
            if self.status == TraderStatus::Active || self.closed.contains(&update.order_id) {
                return;
            }
            let entry = OpenEntry {
                order_id: update.order_id,
                direction: leg.direction(),
                price,
            };
            if let Some(exit) = self.early_exits.remove(&update.order_id) {
                info!(?leg, %price, "Entry filled after its exit, position already closed");
                self.book(leg, entry, exit);
                return;
            }
            info!(?leg, %price, "Entry filled, position open");
            self.entry = Some(entry);
            self.status = TraderStatus::Active;
        } else {
            match self.entry.take() {
                Some(entry) => self.book(leg, entry, price),
                None => {
                    // Child statuses are forwarded independently of the parent's.
                    let Some(parent) = self.bracket.order(leg).parent_id else {
                        return;
                    };
                    if self.closed.contains(&parent) {
                        return;
                    }
                    warn!(?leg, %price, entry_order_id = parent, "Exit filled before its entry");
                    self.early_exits.insert(parent, price);
                }
            }
            self.status = TraderStatus::Cold;
        }
    }

    fn book(&mut self, leg: Leg, entry: OpenEntry, exit: Decimal) {
        let quantity = Decimal::from(self.config.quantity);
        let points = match entry.direction {
            Direction::Long => exit - entry.price,
            Direction::Short => entry.price - exit,
        };
        self.pnl += points * quantity;
        self.closed.insert(entry.order_id);
        info!(?leg, %exit, trade_pnl = %(points * quantity), pnl = %self.pnl, "Exit filled, position closed");
    }

    /// Centres the bracket on the last price and sends all six orders.
    async fn place_orders(&mut self, gateway: &dyn Gateway) -> Result<()> {
        let Some(last) = self.last_price else {
            warn!("No last price yet, not placing orders");
            return Ok(());
        };
        info!(set_price = %last, "Setting order structure");
        self.bracket.reprice(last);
        for order in self.bracket.orders() {
            debug!(order_id = order.order_id, kind = order.kind.code(), "Placing order");
            gateway.place_order(&self.contract, order).await?;
        }
        self.status = TraderStatus::Hot;
        Ok(())
    }

    async fn cancel_orders(&self, gateway: &dyn Gateway) -> Result<()> {
        for order in self.bracket.orders() {
            gateway.cancel_order(order.order_id).await?;
        }
        Ok(())
    }

    /// COLD → fresh order ids, bracket placed → HOT.
    ///
    /// # Errors
    /// Returns an error if the gateway rejects a request.
    pub async fn go_hot(&mut self, gateway: &dyn Gateway) -> Result<()> {
        match self.status {
            TraderStatus::Active => {
                error!("We have active positions, will not change state");
            }
            TraderStatus::Hot => info!("Already hot"),
            TraderStatus::Cold => {
                if self.last_price.is_none() {
                    warn!("No last price yet, staying cold");
                    return Ok(());
                }
                let base = gateway.next_order_id().await?;
                self.bracket.prepare(base);
                self.early_exits.clear();
                self.closed.clear();
                info!(base_order_id = base, "Placing news trader orders");
                self.place_orders(gateway).await?;
            }
        }
        Ok(())
    }

    /// Pulls every order and goes COLD.
    ///
    /// # Errors
    /// Returns an error if a cancel fails.
    pub async fn go_cold(&mut self, gateway: &dyn Gateway) -> Result<()> {
        if self.status == TraderStatus::Active {
            error!("Trader active, there are open positions");
        }
        if matches!(self.status, TraderStatus::Hot | TraderStatus::Active) {
            self.cancel_orders(gateway).await?;
        }
        self.status = TraderStatus::Cold;
        Ok(())
    }

    /// Re-centres the bracket when HOT and the market moved past the threshold.
    ///
    /// # Errors
    /// Returns an error if re-placing an order fails.
    pub async fn adjust(&mut self, gateway: &dyn Gateway) -> Result<bool> {
        if self.status != TraderStatus::Hot {
            return Ok(false);
        }
        let (Some(last), Some(set)) = (self.last_price, self.bracket.set_price()) else {
            return Ok(false);
        };
        if (set - last).abs() <= self.config.delta_adjust {
            return Ok(false);
        }
        info!(from = %set, to = %last, "Updating order prices");
        self.place_orders(gateway).await?;
        Ok(true)
    }

    /// Applies an operator command. Returns `false` on quit.
    ///
    /// # Errors
    /// Returns an error if the gateway rejects a request.
    pub async fn handle_command(&mut self, gateway: &dyn Gateway, command: Command) -> Result<bool> {
        match command {
            Command::Hot => self.go_hot(gateway).await?,
            Command::Cold => self.go_cold(gateway).await?,
            Command::Quit => return Ok(false),
        }
        info!(status = %self.status, "Trader status");
        Ok(true)
    }

    /// Cancels working orders, stops market data and disconnects.
    ///
    /// # Errors
    /// Returns an error if the gateway rejects a request.
    pub async fn stop(&mut self, gateway: &dyn Gateway) -> Result<()> {
        info!("Trader closing down");
        if self.status == TraderStatus::Hot {
            self.cancel_orders(gateway).await?;
            self.status = TraderStatus::Cold;
        }
        gateway
            .cancel_market_data(self.config.market_data_request_id)
            .await?;
        gateway.disconnect().await?;
        info!(pnl = %self.pnl, "Final PnL");
        Ok(())
    }
}

/// Runs the trader until `Q`, end of input or a closed gateway.
///
/// # Errors
/// Returns an error if reading operator input or shutting down fails.
pub async fn run<R>(
    gateway: &dyn Gateway,
    events: &mut EventReceiver,
    config: TraderConfig,
    input: R,
) -> Result<Decimal>
where
    R: AsyncBufRead + Unpin,
{
    let mut trader = NewsTrader::new(config.clone());
    trader.subscribe(gateway).await?;

    let mut arm_pending = config.arm_on_start;
    let mut lines = input.lines();
    let mut adjust = tokio::time::interval(config.adjust_interval());
    adjust.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Entering main trading loop, commands: H(ot), C(old), Q(uit)");
    loop {
        tokio::select! {
            biased;

            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Gateway event stream closed");
                    break;
                };
                trader.on_event(event);
                if arm_pending && trader.last_price().is_some() {
                    arm_pending = false;
                    if let Err(e) = trader.go_hot(gateway).await {
                        error!(error = %e, "Failed to place orders");
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Operator input closed");
                    break;
                };
                match Command::parse(&line) {
                    Some(command) => match trader.handle_command(gateway, command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => error!(error = %e, "Command failed"),
                    },
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line.trim(), "Unknown command, use H, C or Q"),
                }
            }
            _ = adjust.tick() => {
                if let Err(e) = trader.adjust(gateway).await {
                    error!(error = %e, "Failed to update order prices");
                }
            }
        }
    }

    info!("Shutting down main trading loop");
    trader.stop(gateway).await?;
    Ok(trader.pnl())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tws_ib::{OrderKind, RecordedRequest, RecordingGateway};

    fn config() -> TraderConfig {
        TraderConfig {
            expiry: "201812".to_string(),
            ..TraderConfig::default()
        }
    }

    fn last(price: f64) -> GatewayEvent {
        GatewayEvent::TickPrice {
            req_id: 3,
            field: TickField::Last,
            price,
        }
    }

    fn filled(order_id: i32, avg_fill_price: f64) -> GatewayEvent {
        GatewayEvent::OrderStatus(OrderStatusUpdate {
            order_id,
            status: "Filled".to_string(),
            filled: 1.0,
            remaining: 0.0,
            avg_fill_price,
            parent_id: 0,
            last_fill_price: avg_fill_price,
        })
    }

    fn placed(gateway: &RecordingGateway) -> Vec<tws_ib::OrderTicket> {
        gateway
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::PlaceOrder { order, .. } => Some(order),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn stays_cold_without_a_price() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(-1.0));

        trader.go_hot(&gateway).await.unwrap();

        assert_eq!(trader.status(), TraderStatus::Cold);
        assert!(placed(&gateway).is_empty());
    }

    #[tokio::test]
    async fn hot_places_bracket_with_fresh_ids() {
        let (gateway, _events) = RecordingGateway::new();
        let gateway = gateway.with_first_order_id(100);
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(51.5));

        trader.go_hot(&gateway).await.unwrap();

        let orders = placed(&gateway);
        assert_eq!(trader.status(), TraderStatus::Hot);
        assert_eq!(orders.len(), 6);
        assert_eq!(orders[0].order_id, 100);
        assert_eq!(orders[5].parent_id, Some(103));
        assert_eq!(orders[1].kind, OrderKind::Limit { price: dec!(51.7) });
    }

    #[tokio::test]
    async fn long_round_trip_books_pnl() {
        let (gateway, _events) = RecordingGateway::new();
        let gateway = gateway.with_first_order_id(10);
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();

        trader.on_event(filled(10, 50.05));
        assert_eq!(trader.status(), TraderStatus::Active);

        trader.go_hot(&gateway).await.unwrap();
        assert_eq!(trader.status(), TraderStatus::Active);
        assert_eq!(placed(&gateway).len(), 6);

        trader.on_event(filled(11, 50.25));
        assert_eq!(trader.status(), TraderStatus::Cold);
        assert_eq!(trader.pnl(), dec!(0.2));

        trader.on_event(filled(11, 50.25));
        trader.on_event(filled(10, 50.05));
        assert_eq!(trader.status(), TraderStatus::Cold);
        assert_eq!(trader.pnl(), dec!(0.2));
    }

    #[tokio::test]
    async fn exit_fill_ahead_of_entry_fill_goes_cold() {
        let (gateway, _events) = RecordingGateway::new();
        let gateway = gateway.with_first_order_id(10);
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();

        trader.on_event(filled(11, 50.25));
        assert_eq!(trader.status(), TraderStatus::Cold);

        trader.on_event(filled(10, 50.05));
        assert_eq!(trader.status(), TraderStatus::Cold);
        assert_eq!(trader.pnl(), dec!(0.2));

        trader.go_hot(&gateway).await.unwrap();
        assert_eq!(trader.status(), TraderStatus::Hot);
    }

    #[tokio::test]
    async fn short_trail_exit_books_pnl() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();
        let short_entry = trader.bracket().order(Leg::ShortEntry).order_id;
        let short_trail = trader.bracket().order(Leg::ShortTrail).order_id;

        trader.on_event(filled(short_entry, 49.95));
        trader.on_event(filled(short_trail, 50.1));

        assert_eq!(trader.status(), TraderStatus::Cold);
        assert_eq!(trader.pnl(), dec!(-0.15));
    }

    #[tokio::test]
    async fn non_fill_statuses_do_not_move_state() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();
        let entry = trader.bracket().order(Leg::LongEntry).order_id;

        trader.on_event(GatewayEvent::OrderStatus(OrderStatusUpdate {
            order_id: entry,
            status: "Submitted".to_string(),
            filled: 0.0,
            remaining: 1.0,
            avg_fill_price: 0.0,
            parent_id: 0,
            last_fill_price: 0.0,
        }));

        assert_eq!(trader.status(), TraderStatus::Hot);
    }

    #[tokio::test]
    async fn adjust_only_past_threshold() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();

        trader.on_event(last(50.02));
        assert!(!trader.adjust(&gateway).await.unwrap());

        trader.on_event(last(50.03));
        assert!(trader.adjust(&gateway).await.unwrap());
        assert_eq!(trader.bracket().set_price(), Some(dec!(50.03)));

        let orders = placed(&gateway);
        assert_eq!(orders.len(), 12);
        assert_eq!(orders[6].order_id, orders[0].order_id);
    }

    #[tokio::test]
    async fn cold_cancels_everything() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.handle_command(&gateway, Command::Hot).await.unwrap();

        assert!(trader.handle_command(&gateway, Command::Cold).await.unwrap());
        assert!(!trader.handle_command(&gateway, Command::Quit).await.unwrap());

        let cancels = gateway
            .requests()
            .into_iter()
            .filter(|r| matches!(r, RecordedRequest::CancelOrder { .. }))
            .count();
        assert_eq!(cancels, 6);
        assert_eq!(trader.status(), TraderStatus::Cold);
    }

    #[tokio::test]
    async fn cold_from_active_cancels_all_orders() {
        let (gateway, _events) = RecordingGateway::new();
        let mut trader = NewsTrader::new(config());
        trader.on_event(last(50.0));
        trader.go_hot(&gateway).await.unwrap();
        let entry = trader.bracket().order(Leg::LongEntry).order_id;
        trader.on_event(filled(entry, 50.05));
        assert_eq!(trader.status(), TraderStatus::Active);

        assert!(trader.handle_command(&gateway, Command::Cold).await.unwrap());

        let cancelled: Vec<i32> = gateway
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                RecordedRequest::CancelOrder { order_id } => Some(order_id),
                _ => None,
            })
            .collect();
        let ids: Vec<i32> = trader.bracket().orders().iter().map(|o| o.order_id).collect();
        assert_eq!(cancelled, ids);
        assert_eq!(trader.status(), TraderStatus::Cold);
    }

    #[tokio::test]
    async fn manual_mode_waits_for_hot_command() {
        let (gateway, mut events) = RecordingGateway::new();
        let (mut operator, input) = tokio::io::duplex(64);
        let manual = TraderConfig {
            arm_on_start: false,
            ..config()
        };

        let driver = async {
            gateway.emit(last(51.5));
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            assert!(placed(&gateway).is_empty());

            tokio::io::AsyncWriteExt::write_all(&mut operator, b"h\n").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            assert_eq!(placed(&gateway).len(), 6);

            tokio::io::AsyncWriteExt::write_all(&mut operator, b"q\n").await.unwrap();
        };
        let trading = run(&gateway, &mut events, manual, tokio::io::BufReader::new(input));
        let (pnl, ()) = tokio::join!(trading, driver);

        assert_eq!(pnl.unwrap(), Decimal::ZERO);
        assert_eq!(placed(&gateway).len(), 6);
    }

    #[tokio::test]
    async fn run_arms_on_first_price_and_shuts_down_on_quit() {
        let (gateway, mut events) = RecordingGateway::new();
        let (mut operator, input) = tokio::io::duplex(64);

        let driver = async {
            gateway.emit(last(51.5));
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tokio::io::AsyncWriteExt::write_all(&mut operator, b"q\n").await.unwrap();
        };
        let trading = run(&gateway, &mut events, config(), tokio::io::BufReader::new(input));
        let (pnl, ()) = tokio::join!(trading, driver);

        assert_eq!(pnl.unwrap(), Decimal::ZERO);
        let requests = gateway.requests();
        assert!(matches!(requests[0], RecordedRequest::MarketData { req_id: 3, snapshot: false, .. }));
        assert_eq!(placed(&gateway).len(), 6);
        let cancels = requests
            .iter()
            .filter(|r| matches!(r, RecordedRequest::CancelOrder { .. }))
            .count();
        assert_eq!(cancels, 6);
        assert_eq!(requests.last(), Some(&RecordedRequest::Disconnect));
    }
}
