//! Order book metrics calculation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    /// Mid price (average of best bid and ask)
    pub mid_price: Option<f64>,

    /// Spread in basis points
    pub spread_bps: Option<f64>,

    /// Total bid depth (volume)
    pub bid_depth: f64,

    /// Total ask depth (volume)
    pub ask_depth: f64,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    /// Check if the order book is healthy (has valid data)
    pub fn is_healthy(&self) -> bool {
        self.mid_price.is_some()
            && self.spread_bps.is_some()
            && self.bid_levels > 0
            && self.ask_levels > 0
    }

    /// Get volume ratio (bid_depth / ask_depth)
    pub fn volume_ratio(&self) -> Option<f64> {
        if self.ask_depth > 0.0 {
            Some(self.bid_depth / self.ask_depth)
        } else {
            None
        }
    }
}

impl fmt::Display for OrderBookMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mid_price, self.spread_bps) {
            (Some(mid), Some(spread)) => write!(f, "mid: {:.8}, spread: {:.3}bps", mid, spread)?,
            _ => write!(f, "mid: n/a, spread: n/a")?,
        }
        write!(
            f,
            ", depth: {} bid levels / {} ask levels",
            self.bid_levels, self.ask_levels
        )?;
        if let Some(ratio) = self.volume_ratio() {
            write!(f, ", bid/ask volume: {:.3}", ratio)?;
        }
        Ok(())
    }
}
