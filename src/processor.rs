//! Incremental depth processor
//!
//! Owns one order book and one set of latency statistics for a single
//! connection. The connection's worker thread writes, the reporting loop
//! reads snapshots.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::{trace, warn};

use crate::error::{MarketDataError, Result};
use crate::latency::{strip_clock_skew, LatencyStats};
use crate::listener::{DataListener, DepthListener};
use crate::orderbook::{Level, OrderBook, Side};
use crate::parser::DepthUpdate;

#[derive(Debug, Default)]
struct State {
    book: OrderBook,
    stats: LatencyStats,
}

/// Per-connection depth message sink
#[derive(Debug)]
pub struct DepthProcessor {
    build_order_book: bool,
    state: RwLock<State>,
}

impl DepthProcessor {
    pub fn new(build_order_book: bool) -> Self {
        Self {
            build_order_book,
            state: RwLock::new(State::default()),
        }
    }

    pub fn builds_order_book(&self) -> bool {
        self.build_order_book
    }

    /// Process a payload as if it was received at `now`.
    ///
    /// Every level is validated before the book is touched, so a rejected
    /// payload leaves the book as it was.
    pub fn process_at(&self, payload: &str, now: DateTime<Utc>) -> Result<()> {
        let update = DepthUpdate::parse(payload)?;
        let latency = event_latency(update.event_time, now)?;

        let levels = if self.build_order_book {
            Some((update.bid_levels()?, update.ask_levels()?))
        } else {
            None
        };

        let mut state = self.state.write();
        state.stats.add_update(latency);

        if let Some((bids, asks)) = levels {
            trace!(bids = bids.len(), asks = asks.len(), "Applying depth update");
            apply_side(&mut state.book, Side::Bid, &bids);
            apply_side(&mut state.book, Side::Ask, &asks);
        }

        Ok(())
    }
}

fn apply_side(book: &mut OrderBook, side: Side, levels: &[Level]) {
    for level in levels {
        let change = book.insert_replace(side, level.price, level.volume);
        trace!(?side, price = level.price, volume = level.volume, ?change, "Level");
    }
}

/// Sub-minute distance between the event timestamp and `now`.
fn event_latency(event_time_ms: u64, now: DateTime<Utc>) -> Result<Duration> {
    let event_time = i64::try_from(event_time_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| {
            MarketDataError::ParseError(format!("event time out of range: {}", event_time_ms))
        })?;

    let abs_diff = (now - event_time).abs().to_std().map_err(|e| {
        MarketDataError::ParseError(format!("event time {} too far from now: {}", event_time_ms, e))
    })?;

    Ok(strip_clock_skew(abs_diff))
}

impl DataListener for DepthProcessor {
    fn process(&self, payload: &str) -> Result<()> {
        self.process_at(payload, Utc::now())
    }

    fn failure(&self, reason: &str) {
        warn!(reason = %reason, "Depth processor reset after connection failure");

        let mut state = self.state.write();
        state.stats.clear();
        state.book.clear();
    }

    fn statistics(&self) -> LatencyStats {
        self.state.read().stats
    }
}

impl DepthListener for DepthProcessor {
    fn order_book(&self) -> Option<OrderBook> {
        if !self.build_order_book {
            return None;
        }
        Some(self.state.read().book.clone())
    }
}
