//! Binance incremental depth latency meter
//!
//! Connects to every IP a Binance stream host resolves to, measures how far
//! behind each connection's depth events arrive, and optionally maintains an
//! order book per connection.

pub mod config;
pub mod error;
pub mod latency;
pub mod listener;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod processor;
pub mod resolver;
pub mod supervisor;
pub mod websocket;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use latency::LatencyStats;
pub use listener::{DataListener, DepthListener};
pub use orderbook::{OrderBook, OrderBookMetrics};
pub use parser::DepthUpdate;
pub use processor::DepthProcessor;
pub use resolver::{Resolver, SystemResolver};
pub use supervisor::{Report, Supervisor};
pub use websocket::{ConnectionState, Connector, StreamConnection};
