//! Command line and environment configuration

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MarketDataError, Result};
use crate::websocket::{depth_stream_path, ConnectionConfig};

/// Application configuration
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "binance-depth-latency")]
#[command(about = "Measures Binance incremental depth stream latency across every resolved IP")]
#[command(version)]
pub struct Config {
    /// Trading pair symbol (e.g., BTCUSDT)
    #[arg(long, env = "TICKER", default_value = "BTCUSDT")]
    pub ticker: String,

    /// Milliseconds between statistics reports
    #[arg(long, env = "REPORT_PERIOD_MS", default_value_t = 5000)]
    pub period: u64,

    /// Maintain order books and print the one from the fastest connection
    #[arg(long, env = "WITH_ORDERBOOK", default_value_t = true, action = ArgAction::Set)]
    pub with_orderbook: bool,

    /// Number of order book levels to print per side; all when unset
    #[arg(long = "show-orderbook-levels-num", env = "ORDERBOOK_LEVELS")]
    pub show_orderbook_levels_num: Option<usize>,

    /// Stream host to resolve and connect to
    #[arg(long, env = "WS_HOST", default_value = "stream.binance.com")]
    pub host: String,

    /// Stream port
    #[arg(long, env = "WS_PORT", default_value_t = 9443)]
    pub port: u16,

    /// Depth update speed suffix (e.g., 100ms); unthrottled when unset
    #[arg(long, env = "UPDATE_SPEED")]
    pub update_speed: Option<String>,

    /// Milliseconds between keepalive pings
    #[arg(long, env = "PING_INTERVAL_MS", default_value_t = 1000)]
    pub ping_interval_ms: u64,

    /// TCP connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// PEM certificate to trust in addition to the system roots
    #[arg(long, env = "TLS_CA_FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Serve /health and /metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Config {
    /// Load `.env` and parse the command line
    pub fn load() -> std::result::Result<Self, clap::Error> {
        dotenvy::dotenv().ok();
        Self::try_parse()
    }

    /// Reject values clap accepts but the meter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(MarketDataError::ConfigError("ticker must not be empty".to_string()));
        }
        if self.period == 0 {
            return Err(MarketDataError::ConfigError("period must be positive".to_string()));
        }
        if self.ping_interval_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "ping interval must be positive".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "connect timeout must be positive".to_string(),
            ));
        }
        if let Some(speed) = &self.update_speed {
            let valid = speed
                .strip_suffix("ms")
                .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false);
            if !valid {
                return Err(MarketDataError::ConfigError(format!(
                    "update speed must look like 100ms, got {:?}",
                    speed
                )));
            }
        }
        Ok(())
    }

    pub fn subscribe_path(&self) -> String {
        depth_stream_path(self.ticker.trim(), self.update_speed.as_deref())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period)
    }

    /// Per-connection settings; reads the extra CA certificate if one is set
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let root_certificate = match &self.tls_ca_file {
            Some(path) => Some(std::fs::read(path).map_err(|e| {
                MarketDataError::ConfigError(format!("cannot read {}: {}", path.display(), e))
            })?),
            None => None,
        };

        Ok(ConnectionConfig {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            root_certificate,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticker: "BTCUSDT".to_string(),
            period: 5000,
            with_orderbook: true,
            show_orderbook_levels_num: None,
            host: "stream.binance.com".to_string(),
            port: 9443,
            update_speed: None,
            ping_interval_ms: 1000,
            connect_timeout_ms: 5000,
            tls_ca_file: None,
            metrics_port: None,
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["binance-depth-latency"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "--ticker",
            "ETHBTC",
            "--period",
            "1000",
            "--with-orderbook",
            "false",
            "--show-orderbook-levels-num",
            "5",
            "--port",
            "443",
            "--update-speed",
            "100ms",
        ]);

        assert_eq!(config.ticker, "ETHBTC");
        assert_eq!(config.period(), Duration::from_secs(1));
        assert!(!config.with_orderbook);
        assert_eq!(config.show_orderbook_levels_num, Some(5));
        assert_eq!(config.port, 443);
        assert_eq!(config.subscribe_path(), "/ws/ethbtc@depth@100ms");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_subscribe_path() {
        let config = Config::default();
        assert_eq!(config.subscribe_path(), "/ws/btcusdt@depth");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_period = Config {
            period: 0,
            ..Config::default()
        };
        assert!(matches!(
            zero_period.validate(),
            Err(MarketDataError::ConfigError(_))
        ));

        let empty_ticker = Config {
            ticker: "  ".to_string(),
            ..Config::default()
        };
        assert!(empty_ticker.validate().is_err());

        let zero_ping = Config {
            ping_interval_ms: 0,
            ..Config::default()
        };
        assert!(zero_ping.validate().is_err());

        let zero_timeout = Config {
            connect_timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(MarketDataError::ConfigError(msg)) if msg.contains("connect timeout")
        ));

        for speed in ["100", "ms", "fast", "10 ms"] {
            let config = Config {
                update_speed: Some(speed.to_string()),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{speed} should be rejected");
        }
    }

    #[test]
    fn test_connection_config() {
        let config = Config {
            ping_interval_ms: 250,
            connect_timeout_ms: 1500,
            ..Config::default()
        };
        let conn = config.connection_config().unwrap();
        assert_eq!(conn.ping_interval, Duration::from_millis(250));
        assert_eq!(conn.connect_timeout, Duration::from_millis(1500));
        assert!(conn.root_certificate.is_none());
    }

    #[test]
    fn test_tls_ca_file() {
        let config = Config {
            tls_ca_file: Some(PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/tests/fixtures/ca.pem"
            ))),
            ..Config::default()
        };
        let pem = config.connection_config().unwrap().root_certificate.unwrap();
        assert!(pem.starts_with(b"-----BEGIN CERTIFICATE-----"));

        let missing = Config {
            tls_ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..Config::default()
        };
        assert!(matches!(
            missing.connection_config(),
            Err(MarketDataError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        let err = Config::try_parse_from(["binance-depth-latency", "--bogus"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
