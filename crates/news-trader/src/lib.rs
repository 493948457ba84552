//! News trader.
//!
//! Straddles the market with two stop-limit entries, each carrying a target
//! and a trailing stop:
//! - COLD: no orders on the market
//! - HOT: bracket placed, re-centred whenever the last price drifts
//! - ACTIVE: an entry filled, waiting for its target or trail
//!
//! The operator switches between COLD and HOT from the terminal.

pub mod bracket;
pub mod trader;
pub mod types;

pub use bracket::{Bracket, BracketGeometry, Leg};
pub use trader::{run, NewsTrader};
pub use types::{Command, Direction, TraderStatus};
