//! Order book module
//!
//! Maintains the incremental price-level ledger built from depth updates.

mod book;
mod metrics;

pub use book::{BookDisplay, LevelChange, OrderBook};
pub use metrics::OrderBookMetrics;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Two prices closer than this are the same level.
///
/// Distinct exchange levels emitted within this distance of each other
/// collapse into one level.
pub const PRICE_EPSILON: f64 = 1e-6;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Ordering of a resting level's price against `price` in this side's
    /// sequence order: bids descending, asks ascending.
    #[inline]
    pub fn order(self, level_price: f64, price: f64) -> Ordering {
        match self {
            Side::Ask => compare_prices(level_price, price),
            Side::Bid => compare_prices(level_price, price).reverse(),
        }
    }
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub volume: f64,
}

impl Level {
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }
}

/// Epsilon-tolerant total order on prices.
#[inline]
pub fn compare_prices(a: f64, b: f64) -> Ordering {
    let diff = a - b;
    if diff.abs() <= PRICE_EPSILON {
        Ordering::Equal
    } else if diff < 0.0 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Whether a volume is the feed's deletion marker.
#[inline]
pub fn is_zero_volume(volume: f64) -> bool {
    volume.abs() <= PRICE_EPSILON
}
