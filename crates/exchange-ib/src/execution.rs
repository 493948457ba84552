//! Order execution: place, modify and cancel orders via IB.

use anyhow::{Context, Result};
use ibapi::orders::{Action, Order, PlaceOrder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::client::{IBClient, TaskKey};
use crate::error::GatewayError;
use crate::events::{GatewayEvent, OrderStatusUpdate};
use crate::market_data::to_ib_contract;
use crate::types::{ContractSpec, OrderKind, OrderSide, OrderTicket};

fn price(value: Decimal) -> Result<f64, GatewayError> {
    value.to_f64().ok_or(GatewayError::InvalidPrice(value))
}

/// Builds the ibapi order for a ticket.
pub(crate) fn to_ib_order(ticket: &OrderTicket) -> Result<Order, GatewayError> {
    let (limit_price, aux_price, trail_stop_price) = match &ticket.kind {
        OrderKind::Limit { price: limit } => (Some(price(*limit)?), None, None),
        OrderKind::StopLimit { limit, stop } => (Some(price(*limit)?), Some(price(*stop)?), None),
        // For TRAIL the aux price is the trailing amount.
        OrderKind::Trail {
            trail_stop_price,
            offset,
        } => (None, Some(price(*offset)?), Some(price(*trail_stop_price)?)),
    };

    Ok(Order {
        order_id: ticket.order_id,
        action: match ticket.side {
            OrderSide::Buy => Action::Buy,
            OrderSide::Sell => Action::Sell,
        },
        total_quantity: f64::from(ticket.quantity),
        order_type: ticket.kind.code().to_string(),
        limit_price,
        aux_price,
        trail_stop_price,
        parent_id: ticket.parent_id.unwrap_or(0),
        oca_group: ticket.oca_group.clone().unwrap_or_default(),
        transmit: ticket.transmit,
        ..Order::default()
    })
}

impl IBClient {
    pub(crate) fn spawn_order(&self, spec: &ContractSpec, ticket: &OrderTicket) -> Result<()> {
        let contract = to_ib_contract(spec)?;
        let order = to_ib_order(ticket)?;
        let order_id = ticket.order_id;
        let client = self.client.clone();
        let events = self.events.clone();
        info!(
            order_id,
            side = ticket.side.as_str(),
            order_type = ticket.kind.code(),
            quantity = ticket.quantity,
            parent_id = ?ticket.parent_id,
            "Placing order"
        );

        let handle = tokio::spawn(async move {
            let mut subscription = match client.place_order(order_id, &contract, &order).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = events.send(GatewayEvent::Error {
                        req_id: Some(order_id),
                        code: -1,
                        message: format!("place order failed: {e}"),
                    });
                    return;
                }
            };

            while let Some(item) = subscription.next().await {
                let event = match item {
                    Ok(PlaceOrder::OrderStatus(s)) => GatewayEvent::OrderStatus(OrderStatusUpdate {
                        order_id: s.order_id,
                        status: s.status,
                        filled: s.filled,
                        remaining: s.remaining,
                        avg_fill_price: s.average_fill_price,
                        parent_id: s.parent_id,
                        last_fill_price: s.last_fill_price,
                    }),
                    Ok(PlaceOrder::ExecutionData(data)) => GatewayEvent::Execution {
                        order_id: data.execution.order_id,
                        price: data.execution.price,
                        shares: data.execution.shares,
                    },
                    Ok(PlaceOrder::Message(notice)) => GatewayEvent::Error {
                        req_id: Some(order_id),
                        code: notice.code,
                        message: notice.message,
                    },
                    Ok(_) => continue,
                    Err(e) => GatewayEvent::Error {
                        req_id: Some(order_id),
                        code: -1,
                        message: e.to_string(),
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        self.track(TaskKey::Order(order_id), handle);
        Ok(())
    }

    pub(crate) async fn cancel_order_by_id(&self, order_id: i32) -> Result<()> {
        info!(order_id, "Cancelling order");
        let _status = self
            .client
            .cancel_order(order_id, "")
            .await
            .with_context(|| format!("Failed to cancel order {order_id}"))?;
        Ok(())
    }
}
