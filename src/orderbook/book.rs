//! Core order book implementation
//!
//! Each side is a contiguous vector kept in sequence order (bids descending,
//! asks ascending). Prices are located with an epsilon-tolerant binary search,
//! so every update is `O(log n)` to find and `O(n)` worst case to shift.

use std::fmt;

use super::{is_zero_volume, Level, OrderBookMetrics, Side};

/// What a single `insert_replace` call did to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Inserted,
    Replaced,
    Removed,
    /// Deletion of a price that is not in the book
    Ignored,
}

/// Incremental price-level ledger for one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    /// Bids sorted by price descending (highest first)
    bids: Vec<Level>,
    /// Asks sorted by price ascending (lowest first)
    asks: Vec<Level>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one absolute level update.
    ///
    /// An existing level at `price` gets its volume overwritten, or is
    /// removed when `volume` is zero. A new price is inserted at its sorted
    /// position; a zero volume for an unknown price is a silent no-op.
    pub fn insert_replace(&mut self, side: Side, price: f64, volume: f64) -> LevelChange {
        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let remove = is_zero_volume(volume);

        match levels.binary_search_by(|level| side.order(level.price, price)) {
            Ok(idx) if remove => {
                levels.remove(idx);
                LevelChange::Removed
            }
            Ok(idx) => {
                levels[idx].volume = volume;
                LevelChange::Replaced
            }
            Err(_) if remove => LevelChange::Ignored,
            Err(idx) => {
                levels.insert(idx, Level::new(price, volume));
                LevelChange::Inserted
            }
        }
    }

    /// Drop every level on both sides
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    /// Get best bid level
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    /// Get best ask level
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Get spread in basis points
    pub fn spread_bps(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask(), self.mid_price()) {
            (Some(bid), Some(ask), Some(mid)) if mid > 0.0 => {
                Some((ask.price - bid.price) / mid * 10_000.0)
            }
            _ => None,
        }
    }

    /// Calculate order book metrics
    pub fn metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics {
            mid_price: self.mid_price(),
            spread_bps: self.spread_bps(),
            bid_depth: self.bids.iter().map(|l| l.volume).sum(),
            ask_depth: self.asks.iter().map(|l| l.volume).sum(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    /// Side-by-side table of at most `levels` rows, or every row for `None`
    pub fn display(&self, levels: Option<usize>) -> BookDisplay<'_> {
        BookDisplay { book: self, levels }
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(None).fmt(f)
    }
}

/// Diagnostic rendering of an [`OrderBook`]
pub struct BookDisplay<'a> {
    book: &'a OrderBook,
    levels: Option<usize>,
}

impl BookDisplay<'_> {
    fn cell(f: &mut fmt::Formatter<'_>, levels: &[Level], idx: usize) -> fmt::Result {
        match levels.get(idx) {
            Some(level) => write!(f, "| {:>10}@{:<16} |", level.volume, level.price),
            None => write!(f, "|            <empty>          |"),
        }
    }

    fn row(f: &mut fmt::Formatter<'_>, book: &OrderBook, idx: usize) -> fmt::Result {
        write!(f, "\n|")?;
        Self::cell(f, &book.bids, idx)?;
        Self::cell(f, &book.asks, idx)?;
        write!(f, "|")
    }
}

impl fmt::Display for BookDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let book = self.book;
        write!(
            f,
            "OrderBook: BIDS: {}, ASKS: {}",
            book.bids.len(),
            book.asks.len()
        )?;
        match self.levels {
            None => write!(f, ", showing ALL levels")?,
            Some(n) => write!(f, ", showing max {} levels", n)?,
        }
        write!(f, "\n||            BIDS             ||            ASKS             ||")?;

        let rows = book.bids.len().max(book.asks.len());
        if rows == 0 {
            return Self::row(f, book, 0);
        }
        for idx in 0..rows.min(self.levels.unwrap_or(usize::MAX)) {
            Self::row(f, book, idx)?;
        }
        Ok(())
    }
}
