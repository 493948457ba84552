//! The six-order straddle: a long and a short stop-limit entry, each with a
//! limit target and a trailing stop as children.

use rust_decimal::Decimal;

use tws_core::TraderConfig;
use tws_ib::{OrderKind, OrderSide, OrderTicket};

use crate::types::Direction;

pub const ENTRY_OCA: &str = "News Trader";
pub const LONG_OCA: &str = "News_Long";
pub const SHORT_OCA: &str = "News_Short";

/// Position of an order in the bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    LongEntry,
    LongTarget,
    LongTrail,
    ShortEntry,
    ShortTarget,
    ShortTrail,
}

impl Leg {
    pub const ALL: [Leg; 6] = [
        Leg::LongEntry,
        Leg::LongTarget,
        Leg::LongTrail,
        Leg::ShortEntry,
        Leg::ShortTarget,
        Leg::ShortTrail,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn direction(self) -> Direction {
        match self {
            Leg::LongEntry | Leg::LongTarget | Leg::LongTrail => Direction::Long,
            Leg::ShortEntry | Leg::ShortTarget | Leg::ShortTrail => Direction::Short,
        }
    }

    pub fn is_entry(self) -> bool {
        matches!(self, Leg::LongEntry | Leg::ShortEntry)
    }
}

/// Distances of the bracket legs from the set price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketGeometry {
    pub entry_spread: Decimal,
    pub target_spread: Decimal,
    pub trail_spread: Decimal,
    pub quantity: u32,
}

impl From<&TraderConfig> for BracketGeometry {
    fn from(config: &TraderConfig) -> Self {
        Self {
            entry_spread: config.entry_spread,
            target_spread: config.target_spread,
            trail_spread: config.trail_spread,
            quantity: config.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    geometry: BracketGeometry,
    orders: [OrderTicket; 6],
    set_price: Option<Decimal>,
    prepared: bool,
}

fn ticket(side: OrderSide, kind: OrderKind, quantity: u32, oca: &str, transmit: bool) -> OrderTicket {
    OrderTicket {
        order_id: 0,
        side,
        quantity,
        kind,
        parent_id: None,
        oca_group: Some(oca.to_string()),
        transmit,
    }
}

impl Bracket {
    pub fn new(geometry: BracketGeometry) -> Self {
        let q = geometry.quantity;
        let zero = Decimal::ZERO;
        let stop_limit = OrderKind::StopLimit { limit: zero, stop: zero };
        let limit = OrderKind::Limit { price: zero };
        let trail = OrderKind::Trail {
            trail_stop_price: zero,
            offset: zero,
        };
        // Children are held until the trail of their bracket arrives.
        let orders = [
            ticket(OrderSide::Buy, stop_limit.clone(), q, ENTRY_OCA, false),
            ticket(OrderSide::Sell, limit.clone(), q, LONG_OCA, false),
            ticket(OrderSide::Sell, trail.clone(), q, LONG_OCA, true),
            ticket(OrderSide::Sell, stop_limit, q, ENTRY_OCA, false),
            ticket(OrderSide::Buy, limit, q, SHORT_OCA, false),
            ticket(OrderSide::Buy, trail, q, SHORT_OCA, true),
        ];
        Self {
            geometry,
            orders,
            set_price: None,
            prepared: false,
        }
    }

    pub fn geometry(&self) -> &BracketGeometry {
        &self.geometry
    }

    /// Price the bracket is currently centred on.
    pub fn set_price(&self) -> Option<Decimal> {
        self.set_price
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Assigns ids `base..base + 6` in leg order and links each target and
    /// trail to its entry.
    pub fn prepare(&mut self, base: i32) {
        for (offset, order) in (0..).zip(self.orders.iter_mut()) {
            order.order_id = base + offset;
        }
        let long_entry = self.orders[Leg::LongEntry.index()].order_id;
        let short_entry = self.orders[Leg::ShortEntry.index()].order_id;
        for leg in [Leg::LongTarget, Leg::LongTrail] {
            self.orders[leg.index()].parent_id = Some(long_entry);
        }
        for leg in [Leg::ShortTarget, Leg::ShortTrail] {
            self.orders[leg.index()].parent_id = Some(short_entry);
        }
        self.prepared = true;
    }

    /// Centres every leg on `set`.
    pub fn reprice(&mut self, set: Decimal) {
        let BracketGeometry {
            entry_spread: entry,
            target_spread: target,
            trail_spread: trail,
            ..
        } = self.geometry;

        self.orders[Leg::LongEntry.index()].kind = OrderKind::StopLimit {
            limit: set + entry,
            stop: set + entry,
        };
        self.orders[Leg::LongTarget.index()].kind = OrderKind::Limit { price: set + target };
        self.orders[Leg::LongTrail.index()].kind = OrderKind::Trail {
            trail_stop_price: set - trail,
            offset: trail,
        };

        self.orders[Leg::ShortEntry.index()].kind = OrderKind::StopLimit {
            limit: set - entry,
            stop: set - entry,
        };
        self.orders[Leg::ShortTarget.index()].kind = OrderKind::Limit { price: set - target };
        self.orders[Leg::ShortTrail.index()].kind = OrderKind::Trail {
            trail_stop_price: set + trail,
            offset: trail,
        };

        self.set_price = Some(set);
    }

    /// All six orders in leg order.
    pub fn orders(&self) -> &[OrderTicket] {
        &self.orders
    }

    pub fn order(&self, leg: Leg) -> &OrderTicket {
        &self.orders[leg.index()]
    }

    /// Which leg `order_id` is, once ids are assigned.
    pub fn leg_of(&self, order_id: i32) -> Option<Leg> {
        if !self.prepared {
            return None;
        }
        Leg::ALL
            .into_iter()
            .find(|leg| self.orders[leg.index()].order_id == order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bracket() -> Bracket {
        Bracket::new(BracketGeometry::from(&TraderConfig::default()))
    }

    #[test]
    fn prepare_links_children_to_entries() {
        let mut b = bracket();
        b.prepare(100);

        let ids: Vec<i32> = b.orders().iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![100, 101, 102, 103, 104, 105]);
        assert_eq!(b.order(Leg::LongEntry).parent_id, None);
        assert_eq!(b.order(Leg::LongTarget).parent_id, Some(100));
        assert_eq!(b.order(Leg::LongTrail).parent_id, Some(100));
        assert_eq!(b.order(Leg::ShortTarget).parent_id, Some(103));
        assert_eq!(b.order(Leg::ShortTrail).parent_id, Some(103));
        assert_eq!(b.leg_of(104), Some(Leg::ShortTarget));
        assert_eq!(b.leg_of(99), None);
    }

    #[test]
    fn oca_groups_and_transmit_flags() {
        let b = bracket();
        let oca = |leg: Leg| b.order(leg).oca_group.as_deref();
        assert_eq!(oca(Leg::LongEntry), Some(ENTRY_OCA));
        assert_eq!(oca(Leg::ShortEntry), Some(ENTRY_OCA));
        assert_eq!(oca(Leg::LongTrail), Some(LONG_OCA));
        assert_eq!(oca(Leg::ShortTarget), Some(SHORT_OCA));

        let transmitting: Vec<Leg> = Leg::ALL.into_iter().filter(|l| b.order(*l).transmit).collect();
        assert_eq!(transmitting, vec![Leg::LongTrail, Leg::ShortTrail]);
    }

    #[test]
    fn reprice_is_symmetric_around_set_price() {
        let mut b = bracket();
        b.reprice(dec!(51.50));

        assert_eq!(
            b.order(Leg::LongEntry).kind,
            OrderKind::StopLimit { limit: dec!(51.55), stop: dec!(51.55) }
        );
        assert_eq!(b.order(Leg::LongTarget).kind, OrderKind::Limit { price: dec!(51.70) });
        assert_eq!(
            b.order(Leg::LongTrail).kind,
            OrderKind::Trail { trail_stop_price: dec!(51.30), offset: dec!(0.2) }
        );
        assert_eq!(
            b.order(Leg::ShortEntry).kind,
            OrderKind::StopLimit { limit: dec!(51.45), stop: dec!(51.45) }
        );
        assert_eq!(b.order(Leg::ShortTarget).kind, OrderKind::Limit { price: dec!(51.30) });
        assert_eq!(
            b.order(Leg::ShortTrail).kind,
            OrderKind::Trail { trail_stop_price: dec!(51.70), offset: dec!(0.2) }
        );
        assert_eq!(b.set_price(), Some(dec!(51.50)));
    }

    #[test]
    fn sides_alternate_per_bracket() {
        let b = bracket();
        let sides: Vec<OrderSide> = b.orders().iter().map(|o| o.side).collect();
        assert_eq!(
            sides,
            vec![OrderSide::Buy, OrderSide::Sell, OrderSide::Sell, OrderSide::Sell, OrderSide::Buy, OrderSide::Buy]
        );
    }
}
