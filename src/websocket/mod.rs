//! WebSocket module for Binance depth stream connections

mod client;
mod connection;
mod keepalive;

pub use client::{Inbound, WebSocketClient};
pub use connection::{depth_stream_path, ConnectionConfig, StreamConnection};
pub use keepalive::PingTracker;

use std::fmt;

use crate::error::Result;

/// Lifecycle of a single stream connection. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    /// TLS client handshake
    Handshaking,
    /// WebSocket upgrade on the subscribe path
    Subscribing,
    Reading,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Reading => "reading",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Control surface of a running stream connection
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Begin connecting on a dedicated worker
    fn start(&self) -> Result<()>;

    /// Stop and join the worker. Idempotent.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Remote IP this connection dials
    fn host(&self) -> String;
}
