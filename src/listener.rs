//! Consumer side of a stream connection

use crate::error::Result;
use crate::latency::LatencyStats;
use crate::orderbook::OrderBook;

/// Receives every data frame a connection reads.
///
/// Calls for one connection arrive strictly in frame order and never
/// overlap. Readers of the snapshot accessors may run on any thread.
pub trait DataListener: Send + Sync {
    /// Consume one payload. An error rejects it and fails the connection.
    fn process(&self, payload: &str) -> Result<()>;

    /// The owning connection hit an unrecoverable error. Called at most once.
    fn failure(&self, reason: &str);

    /// Copy of the latency statistics gathered so far
    fn statistics(&self) -> LatencyStats;
}

/// A listener that also maintains an order book
pub trait DepthListener: DataListener {
    /// Copy of the book, or `None` when book building is disabled
    fn order_book(&self) -> Option<OrderBook>;
}
