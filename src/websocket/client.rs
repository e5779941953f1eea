//! WebSocket client for a single Binance stream endpoint
//!
//! Dials a resolved IP, runs the TLS handshake against the configured server
//! name, then upgrades to WebSocket on the subscribe path.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tokio_tungstenite::{
    client_async_with_config,
    tungstenite::protocol::{Message, WebSocketConfig},
    WebSocketStream,
};
use tracing::{debug, info, warn};

use super::{ConnectionConfig, ConnectionState};
use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<TlsStream<TcpStream>>;

/// What one read produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text (or binary, decoded lossily) data frame
    Data(String),
    /// Answer to one of our pings
    Pong,
    /// Peer ping (already answered) or a raw frame
    Control,
}

/// WebSocket config tuned for low-latency reads
fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        write_buffer_size: 0,
        ..Default::default()
    }
}

fn tls_connector(config: &ConnectionConfig) -> Result<tokio_native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if let Some(pem) = &config.root_certificate {
        builder.add_root_certificate(native_tls::Certificate::from_pem(pem)?);
    }
    Ok(tokio_native_tls::TlsConnector::from(builder.build()?))
}

/// WebSocket client for one connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: SocketAddr,
}

impl WebSocketClient {
    /// Connect, TLS-handshake and subscribe.
    ///
    /// `on_state` is told about each phase before it starts.
    pub async fn open(
        endpoint: SocketAddr,
        server_name: &str,
        path: &str,
        config: &ConnectionConfig,
        mut on_state: impl FnMut(ConnectionState),
    ) -> Result<Self> {
        on_state(ConnectionState::Connecting);
        let tcp = timeout(config.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| MarketDataError::ConnectionTimeout)?
            .map_err(|e| {
                MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
            })?;
        tcp.set_nodelay(true)?;
        debug!(host = %endpoint.ip(), "TCP connected");

        on_state(ConnectionState::Handshaking);
        let connector = tls_connector(config)?;
        let tls = connector.connect(server_name, tcp).await?;
        debug!(host = %endpoint.ip(), server_name, "TLS handshake complete");

        on_state(ConnectionState::Subscribing);
        let url = format!("wss://{}:{}{}", server_name, endpoint.port(), path);
        let (stream, response) = client_async_with_config(url.as_str(), tls, Some(ws_config()))
            .await
            .map_err(|e| {
                MarketDataError::WebSocketConnection(format!("Handshake failed: {}", e))
            })?;

        info!(host = %endpoint.ip(), url = %url, status = ?response.status(), "WebSocket connected");

        Ok(Self {
            stream: Some(stream),
            endpoint,
        })
    }

    fn stream(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))
    }

    /// Receive the next frame
    pub async fn recv(&mut self) -> Result<Inbound> {
        let host = self.endpoint.ip();
        let next = self.stream()?.next().await;

        match next {
            Some(Ok(Message::Text(text))) => {
                debug!(host = %host, len = text.len(), "Received text message");
                Ok(Inbound::Data(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Inbound::Data(text))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!(host = %host, "Received ping, sending pong");
                self.stream()?
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
                Ok(Inbound::Control)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!(host = %host, "Received pong");
                Ok(Inbound::Pong)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(host = %host, frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(Inbound::Control),
            Some(Err(e)) => {
                self.stream = None;
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    /// Send a keepalive ping
    pub async fn ping(&mut self) -> Result<()> {
        self.stream()?
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
