//! Connection supervisor
//!
//! Opens one stream connection per resolved IP, each feeding its own depth
//! processor, and periodically reports which IP delivers depth updates with
//! the lowest latency. Failed connections are not retried; they drop out of
//! the report.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::latency::LatencyStats;
use crate::listener::{DataListener, DepthListener};
use crate::metrics::ConnectionMetrics;
use crate::orderbook::OrderBook;
use crate::processor::DepthProcessor;
use crate::websocket::{Connector, StreamConnection};

struct Entry {
    connection: Box<dyn Connector>,
    processor: Arc<DepthProcessor>,
}

/// One line of the periodic report
#[derive(Debug, Clone, PartialEq)]
pub struct HostStatistics {
    pub host: String,
    pub stats: LatencyStats,
}

/// Snapshot of every running connection, fastest first
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub rows: Vec<HostStatistics>,
    /// Book of the fastest connection, when book building is enabled
    pub book: Option<OrderBook>,
    pub levels: Option<usize>,
}

impl Report {
    pub fn best(&self) -> Option<&HostStatistics> {
        self.rows.first()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics:")?;
        for row in &self.rows {
            writeln!(f, "{:>15}: {}", row.host, row.stats)?;
        }
        if let Some(book) = &self.book {
            writeln!(f, "OrderBook from the best listener:")?;
            writeln!(f, "{}", book.display(self.levels))?;
            writeln!(f, "{}", book.metrics())?;
        }
        Ok(())
    }
}

/// Owns every connection and its processor
pub struct Supervisor {
    entries: Vec<Entry>,
    period: Duration,
    levels: Option<usize>,
    metrics: Option<ConnectionMetrics>,
}

impl Supervisor {
    /// Start one connection per IP.
    ///
    /// A connection that fails to start is kept; it reports as not running.
    pub fn launch(config: &Config, ips: &[Ipv4Addr]) -> Result<Self> {
        if ips.is_empty() {
            return Err(MarketDataError::NoAddresses(config.host.clone()));
        }

        let path = config.subscribe_path();
        let connection_config = config.connection_config()?;
        let mut entries = Vec::with_capacity(ips.len());

        for ip in ips {
            let processor = Arc::new(DepthProcessor::new(config.with_orderbook));
            let listener: Arc<dyn DataListener> = processor.clone();
            let connection = StreamConnection::new(
                SocketAddr::from((*ip, config.port)),
                config.host.clone(),
                path.clone(),
                Arc::downgrade(&listener),
                connection_config.clone(),
            );

            if let Err(e) = connection.start() {
                warn!(host = %ip, error = %e, "Failed to start listening");
            }

            entries.push(Entry {
                connection: Box::new(connection),
                processor,
            });
        }

        info!(connections = entries.len(), path = %path, "Supervisor launched");
        Ok(Self::from_entries(
            entries,
            config.period(),
            config.show_orderbook_levels_num,
        ))
    }

    fn from_entries(entries: Vec<Entry>, period: Duration, levels: Option<usize>) -> Self {
        Self {
            entries,
            period,
            levels,
            metrics: None,
        }
    }

    /// Publish per-host gauges on every report
    pub fn with_metrics(mut self, metrics: ConnectionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn running(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.connection.is_running())
            .count()
    }

    /// Rank running connections; `None` once every connection is down
    pub fn report(&self) -> Option<Report> {
        let mut ranked: Vec<(&Entry, HostStatistics)> = self
            .entries
            .iter()
            .filter(|entry| entry.connection.is_running())
            .map(|entry| {
                let row = HostStatistics {
                    host: entry.connection.host(),
                    stats: entry.processor.statistics(),
                };
                (entry, row)
            })
            .collect();

        if ranked.is_empty() {
            return None;
        }

        ranked.sort_by_key(|(_, row)| (row.stats.is_empty(), row.stats.average()));

        let book = ranked[0].0.processor.order_book();
        match &book {
            None if ranked[0].0.processor.builds_order_book() => {
                warn!(host = %ranked[0].1.host, "Best listener returned no order book");
            }
            Some(book) if !book.metrics().is_healthy() => {
                debug!(host = %ranked[0].1.host, "Best listener's order book is one-sided");
            }
            _ => {}
        }

        Some(Report {
            rows: ranked.into_iter().map(|(_, row)| row).collect(),
            book,
            levels: self.levels,
        })
    }

    fn refresh_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            for entry in &self.entries {
                metrics.observe(
                    &entry.connection.host(),
                    entry.connection.is_running(),
                    &entry.processor.statistics(),
                );
            }
        }
    }

    /// Report every period until cancelled or every connection is down
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.refresh_metrics();

            match self.report() {
                Some(report) => {
                    let best = report.best().map(|row| row.host.as_str()).unwrap_or_default();
                    info!(best = %best, running = report.rows.len(), "\n{}", report);
                }
                None => {
                    warn!("All connections are down, time to stop");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = sleep(self.period) => {}
            }
        }
    }

    /// Stop every connection, joining their workers
    pub fn shutdown(&self) {
        info!("Stopping measurers");
        for entry in &self.entries {
            entry.connection.stop();
        }
    }
}
