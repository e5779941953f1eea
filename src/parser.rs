//! Parser module for Binance incremental depth messages
//!
//! Decodes one `<symbol>@depth` payload into its event time and the raw
//! textual level changes for each side.

use serde::{Deserialize, Deserializer};

use crate::error::{MarketDataError, Result};
use crate::orderbook::Level;

/// Binance incremental depth update
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdate {
    /// Event time (milliseconds since epoch)
    #[serde(rename = "E")]
    pub event_time: u64,

    /// Bid changes, absent when the event carries none
    #[serde(rename = "b", default, deserialize_with = "present_levels")]
    pub bids: Option<Vec<RawLevel>>,

    /// Ask changes, absent when the event carries none
    #[serde(rename = "a", default, deserialize_with = "present_levels")]
    pub asks: Option<Vec<RawLevel>>,
}

/// A `[price, volume]` pair exactly as sent by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLevel(pub String, pub String);

impl RawLevel {
    pub fn price(&self) -> &str {
        &self.0
    }

    pub fn volume(&self) -> &str {
        &self.1
    }

    /// Convert both decimal strings to a numeric level
    pub fn parse(&self) -> Result<Level> {
        Ok(Level::new(
            parse_number("price", &self.0)?,
            parse_number("volume", &self.1)?,
        ))
    }
}

impl DepthUpdate {
    /// Parse a raw WebSocket payload
    ///
    /// Non-object payloads and a missing `E` field are parse errors.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(MarketDataError::from)
    }

    /// Numeric bid changes, failing on the first malformed level
    pub fn bid_levels(&self) -> Result<Vec<Level>> {
        parse_levels(self.bids.as_deref())
    }

    /// Numeric ask changes, failing on the first malformed level
    pub fn ask_levels(&self) -> Result<Vec<Level>> {
        parse_levels(self.asks.as_deref())
    }
}

/// A side that is present must be an array; `null` is rejected.
fn present_levels<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<RawLevel>>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<RawLevel>::deserialize(deserializer).map(Some)
}

fn parse_levels(raw: Option<&[RawLevel]>) -> Result<Vec<Level>> {
    raw.unwrap_or_default().iter().map(RawLevel::parse).collect()
}

fn parse_number(field: &'static str, value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(MarketDataError::InvalidLevel {
            field,
            value: value.to_string(),
        }),
    }
}
