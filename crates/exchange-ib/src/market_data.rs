//! Contract details and market data requests.

use anyhow::Result;
use ibapi::contracts::{Contract, SecurityType};
use ibapi::market_data::realtime::TickTypes;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::client::{IBClient, TaskKey};
use crate::error::GatewayError;
use crate::events::{GatewayEvent, TickField};
use crate::types::{ContractSpec, OptionComputation};

/// Builds the ibapi contract for a spec.
pub(crate) fn to_ib_contract(spec: &ContractSpec) -> Result<Contract, GatewayError> {
    let strike = match spec.strike {
        Some(strike) => strike.to_f64().ok_or(GatewayError::InvalidPrice(strike))?,
        None => 0.0,
    };
    if spec.symbol.is_empty() {
        return Err(GatewayError::InvalidContract(
            spec.display_name(),
            "empty symbol".to_string(),
        ));
    }
    let right = spec.right.map(|r| r.to_string()).unwrap_or_default();
    let multiplier = spec.multiplier.clone().unwrap_or_default();

    Ok(Contract {
        symbol: spec.symbol.as_str().into(),
        security_type: SecurityType::from(spec.sec_type.as_str()),
        exchange: spec.exchange.as_str().into(),
        currency: spec.currency.as_str().into(),
        trading_class: spec.trading_class.as_str().into(),
        last_trade_date_or_contract_month: spec.expiry.as_str().into(),
        strike,
        right: right.as_str().into(),
        multiplier: multiplier.as_str().into(),
        ..Default::default()
    })
}

impl IBClient {
    pub(crate) fn spawn_contract_details(&self, req_id: i32, spec: &ContractSpec) -> Result<()> {
        let contract = to_ib_contract(spec)?;
        let client = self.client.clone();
        let events = self.events.clone();
        debug!(req_id, contract = %spec.display_name(), "Requesting contract details");

        let handle = tokio::spawn(async move {
            match client.contract_details(&contract).await {
                Ok(details) => {
                    for detail in details {
                        let _ = events.send(GatewayEvent::ContractDetails {
                            req_id,
                            con_id: i64::from(detail.contract.contract_id),
                            last_trade_date: detail.contract.last_trade_date_or_contract_month.to_string(),
                        });
                    }
                    let _ = events.send(GatewayEvent::ContractDetailsEnd { req_id });
                }
                Err(e) => {
                    let _ = events.send(GatewayEvent::Error {
                        req_id: Some(req_id),
                        code: -1,
                        message: format!("contract details failed: {e}"),
                    });
                }
            }
        });
        self.track(TaskKey::ContractDetails(req_id), handle);
        Ok(())
    }

    pub(crate) fn spawn_market_data(
        &self,
        req_id: i32,
        spec: &ContractSpec,
        snapshot: bool,
    ) -> Result<()> {
        let contract = to_ib_contract(spec)?;
        let client = self.client.clone();
        let events = self.events.clone();
        debug!(req_id, snapshot, contract = %spec.display_name(), "Requesting market data");

        let handle = tokio::spawn(async move {
            let request = client.market_data(&contract);
            let request = if snapshot { request.snapshot() } else { request };
            let mut subscription = match request.subscribe().await {
                Ok(subscription) => subscription,
                Err(e) => {
                    let _ = events.send(GatewayEvent::Error {
                        req_id: Some(req_id),
                        code: -1,
                        message: format!("market data request failed: {e}"),
                    });
                    return;
                }
            };

            while let Some(item) = subscription.next().await {
                let event = match item {
                    Ok(TickTypes::Price(tick)) => GatewayEvent::TickPrice {
                        req_id,
                        field: TickField::from_code(tick.tick_type as i32),
                        price: tick.price,
                    },
                    Ok(TickTypes::OptionComputation(c)) => GatewayEvent::OptionComputation {
                        req_id,
                        tick_type: c.field as i32,
                        computation: OptionComputation {
                            implied_volatility: c.implied_volatility,
                            delta: c.delta,
                            gamma: c.gamma,
                            theta: c.theta,
                            vega: c.vega,
                            option_price: c.option_price,
                            underlying_price: c.underlying_price,
                        },
                    },
                    Ok(TickTypes::SnapshotEnd) => {
                        let _ = events.send(GatewayEvent::SnapshotEnd { req_id });
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => GatewayEvent::Error {
                        req_id: Some(req_id),
                        code: -1,
                        message: e.to_string(),
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        self.track(TaskKey::MarketData(req_id), handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptionRight;
    use rust_decimal_macros::dec;

    #[test]
    fn option_leg_maps_to_ib_fields() {
        let spec = ContractSpec::new("CL", "FOP", "NYMEX", "USD")
            .with_trading_class("LO")
            .with_option("201902", dec!(40.5), OptionRight::Put);
        let contract = to_ib_contract(&spec).unwrap();
        assert_eq!(contract.strike, 40.5);
        assert_eq!(contract.last_trade_date_or_contract_month.to_string(), "201902");
    }

    #[test]
    fn empty_symbol_is_rejected() {
        let spec = ContractSpec::new("", "FUT", "NYMEX", "USD");
        assert!(matches!(
            to_ib_contract(&spec),
            Err(GatewayError::InvalidContract(..))
        ));
    }
}
