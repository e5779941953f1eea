//! Binance depth latency meter
//!
//! Resolves the stream host, opens one depth stream per IP and reports the
//! latency of each connection every period.

use clap::error::ErrorKind;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use binance_depth_latency::metrics::{serve_http, ConnectionMetrics};
use binance_depth_latency::{Config, MarketDataError, Resolver, Supervisor, SystemResolver};

const EXIT_HELP: u8 = 1;
const EXIT_BAD_CONFIG: u8 = 2;
const EXIT_NO_ADDRESSES: u8 = 3;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_thread_names(true)).init();
    }
}

/// Cancel `cancel` on SIGINT, or SIGTERM on unix
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {},
                        _ = sigterm.recv() => {},
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to register SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Shutdown signal received");
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = e.print();
                return Ok(ExitCode::from(EXIT_HELP));
            }
            _ => e.exit(),
        },
    };

    init_tracing(config.log_json);
    info!("Starting Binance depth latency meter");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Ok(ExitCode::from(EXIT_BAD_CONFIG));
    }
    info!(
        ticker = %config.ticker,
        host = %config.host,
        port = config.port,
        path = %config.subscribe_path(),
        "Configuration loaded"
    );

    let host = config.host.clone();
    let ips = tokio::task::spawn_blocking(move || SystemResolver.resolve(&host)).await?;
    info!(count = ips.len(), ips = ?ips, "Resolved IPs");

    let supervisor = match Supervisor::launch(&config, &ips) {
        Ok(supervisor) => supervisor,
        Err(e @ MarketDataError::NoAddresses(_)) => {
            error!(error = %e, "Nothing to connect to");
            return Ok(ExitCode::from(EXIT_NO_ADDRESSES));
        }
        Err(e @ MarketDataError::ConfigError(_)) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::from(EXIT_BAD_CONFIG));
        }
        Err(e) => return Err(e.into()),
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let supervisor = match config.metrics_port {
        Some(port) => {
            let registry = prometheus::Registry::new();
            let metrics = ConnectionMetrics::register(&registry)?;
            let server_cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_http(port, registry, server_cancel).await {
                    warn!(error = %e, "Metrics server error");
                }
            });
            supervisor.with_metrics(metrics)
        }
        None => supervisor,
    };

    supervisor.run(cancel.clone()).await;
    cancel.cancel();

    tokio::task::spawn_blocking(move || supervisor.shutdown()).await?;
    info!("Stopped");

    Ok(ExitCode::SUCCESS)
}
