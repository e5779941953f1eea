//! Stream connection state machine
//!
//! Each connection runs on a dedicated OS thread with its own
//! `current_thread` tokio runtime: connect, TLS handshake, WebSocket upgrade,
//! then a read loop interleaved with keepalive pings. Every data frame is
//! handed to the listener before the next read is issued.
//!
//! The first failure (transport error, ping timeout, rejected payload) is
//! reported to the listener exactly once and stops the connection for good.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Connector, Inbound, PingTracker, WebSocketClient};
use crate::error::{MarketDataError, Result};
use crate::listener::DataListener;

/// Subscribe path for a ticker's incremental depth stream.
///
/// Without `update_speed` the exchange pushes at its unthrottled rate;
/// `Some("100ms")` batches updates at the cost of latency.
pub fn depth_stream_path(ticker: &str, update_speed: Option<&str>) -> String {
    match update_speed {
        Some(speed) => format!("/ws/{}@depth@{}", ticker.to_lowercase(), speed),
        None => format!("/ws/{}@depth", ticker.to_lowercase()),
    }
}

/// Timing and TLS knobs for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
    /// PEM certificate trusted in addition to the system roots
    pub root_certificate: Option<Vec<u8>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            root_certificate: None,
        }
    }
}

/// State visible to both the worker and the controlling thread
#[derive(Debug)]
struct Shared {
    host: String,
    running: AtomicBool,
    ready: AtomicBool,
    state: Mutex<ConnectionState>,
    failure_reason: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Stopped {
            *state = next;
        }
    }

    /// First failure wins; later ones, and failures after `stop`, are dropped.
    fn report_failure(&self, listener: Option<&dyn DataListener>, reason: &str) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(host = %self.host, reason = %reason, "Ignoring failure of stopped connection");
            return;
        }

        error!(host = %self.host, reason = %reason, "Connection failed");
        if let Some(listener) = listener {
            listener.failure(reason);
        }
        *self.failure_reason.lock() = Some(reason.to_string());
        self.set_state(ConnectionState::Stopped);
        self.cancel.cancel();
    }
}

/// One WebSocket connection to one resolved exchange IP
pub struct StreamConnection {
    endpoint: SocketAddr,
    server_name: String,
    path: String,
    config: ConnectionConfig,
    listener: Weak<dyn DataListener>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConnection {
    /// `server_name` is used for TLS verification and the `Host` header;
    /// `endpoint` is the IP actually dialled.
    pub fn new(
        endpoint: SocketAddr,
        server_name: impl Into<String>,
        path: impl Into<String>,
        listener: Weak<dyn DataListener>,
        config: ConnectionConfig,
    ) -> Self {
        let host = endpoint.ip().to_string();
        let path = path.into();
        debug!(host = %host, path = %path, "Creating stream connection");

        Self {
            endpoint,
            server_name: server_name.into(),
            path,
            config,
            listener,
            shared: Arc::new(Shared {
                host,
                running: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                state: Mutex::new(ConnectionState::Idle),
                failure_reason: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Whether the WebSocket handshake completed
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.shared.failure_reason.lock().clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Connector for StreamConnection {
    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.state() == ConnectionState::Stopped {
            return Err(MarketDataError::Stopped);
        }
        if worker.is_some() {
            return Err(MarketDataError::AlreadyStarted);
        }

        self.shared.running.store(true, Ordering::Release);
        let session = Session {
            endpoint: self.endpoint,
            server_name: self.server_name.clone(),
            path: self.path.clone(),
            config: self.config.clone(),
            listener: self.listener.clone(),
            shared: self.shared.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("depth-{}", self.shared.host))
            .spawn(move || session.run());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!(host = %self.shared.host, path = %self.path, "Stream connection started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.set_state(ConnectionState::Stopped);
                Err(e.into())
            }
        }
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.cancel.cancel();
        self.shared.set_state(ConnectionState::Stopped);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(host = %self.shared.host, "Connection worker panicked");
            }
            info!(host = %self.shared.host, "Stream connection stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn host(&self) -> String {
        self.shared.host.clone()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns
struct Session {
    endpoint: SocketAddr,
    server_name: String,
    path: String,
    config: ConnectionConfig,
    listener: Weak<dyn DataListener>,
    shared: Arc<Shared>,
}

impl Session {
    fn run(self) {
        debug!(host = %self.shared.host, "Executing connection thread");

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.fail(&MarketDataError::from(e).to_string());
                return;
            }
        };

        let cancel = self.shared.cancel.clone();
        let result = runtime.block_on(async {
            tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = self.drive() => result,
            }
        });

        if let Err(e) = result {
            self.fail(&e.to_string());
        }
        self.shared.running.store(false, Ordering::Release);
        self.shared.set_state(ConnectionState::Stopped);

        if let Some(reason) = self.shared.failure_reason.lock().as_deref() {
            info!(host = %self.shared.host, reason = %reason, "Stopped because of failure");
        }
    }

    fn fail(&self, reason: &str) {
        let listener = self.listener.upgrade();
        self.shared.report_failure(listener.as_deref(), reason);
    }

    async fn drive(&self) -> Result<()> {
        let mut client = WebSocketClient::open(
            self.endpoint,
            &self.server_name,
            &self.path,
            &self.config,
            |state| self.shared.set_state(state),
        )
        .await?;

        self.shared.ready.store(true, Ordering::Release);
        self.shared.set_state(ConnectionState::Reading);

        let period = self.config.ping_interval;
        let mut ping_timer = interval_at(Instant::now() + period, period);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut keepalive = PingTracker::new();

        while self.shared.running.load(Ordering::Acquire) && client.is_connected() {
            tokio::select! {
                _ = ping_timer.tick() => {
                    keepalive.ping_due()?;
                    client.ping().await?;
                    keepalive.ping_sent();
                }
                inbound = client.recv() => match inbound? {
                    Inbound::Data(payload) => {
                        let listener = self.listener.upgrade().ok_or(MarketDataError::ListenerGone)?;
                        listener
                            .process(&payload)
                            .map_err(|e| MarketDataError::Rejected(e.to_string()))?;
                    }
                    Inbound::Pong => {
                        if !keepalive.pong_received() {
                            debug!(host = %self.shared.host, "Unsolicited pong");
                        }
                    }
                    Inbound::Control => {}
                },
            }
        }

        if self.shared.running.load(Ordering::Acquire) {
            warn!(host = %self.shared.host, "Read loop ended while running");
        }
        debug!(
            host = %self.shared.host,
            pings = keepalive.sent(),
            pongs = keepalive.answered(),
            "Read loop finished"
        );
        client.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::LatencyStats;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingListener {
        failures: AtomicUsize,
        reasons: Mutex<Vec<String>>,
    }

    impl DataListener for CountingListener {
        fn process(&self, _payload: &str) -> Result<()> {
            Ok(())
        }

        fn failure(&self, reason: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            self.reasons.lock().push(reason.to_string());
        }

        fn statistics(&self) -> LatencyStats {
            LatencyStats::new()
        }
    }

    fn shared() -> Shared {
        Shared {
            host: "127.0.0.1".to_string(),
            running: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Reading),
            failure_reason: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_depth_stream_path() {
        assert_eq!(depth_stream_path("BTCUSDT", None), "/ws/btcusdt@depth");
        assert_eq!(
            depth_stream_path("EthBtc", Some("100ms")),
            "/ws/ethbtc@depth@100ms"
        );
    }

    #[test]
    fn test_failure_reported_once() {
        let shared = shared();
        let listener = CountingListener::default();

        shared.report_failure(Some(&listener), "socket closed");
        shared.report_failure(Some(&listener), "Previous ping was not ponged");

        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
        assert_eq!(listener.reasons.lock().as_slice(), ["socket closed"]);
        assert_eq!(shared.failure_reason.lock().as_deref(), Some("socket closed"));
        assert!(!shared.running.load(Ordering::SeqCst));
        assert!(shared.cancel.is_cancelled());
        assert_eq!(*shared.state.lock(), ConnectionState::Stopped);
    }

    #[test]
    fn test_failure_after_stop_is_suppressed() {
        let shared = shared();
        shared.running.store(false, Ordering::SeqCst);
        let listener = CountingListener::default();

        shared.report_failure(Some(&listener), "socket closed");

        assert_eq!(listener.failures.load(Ordering::SeqCst), 0);
        assert!(shared.failure_reason.lock().is_none());
    }

    #[test]
    fn test_stopped_state_is_terminal() {
        let shared = shared();
        shared.set_state(ConnectionState::Stopped);
        shared.set_state(ConnectionState::Reading);
        assert_eq!(*shared.state.lock(), ConnectionState::Stopped);
    }

    #[test]
    fn test_stop_before_start() {
        let listener: Arc<dyn DataListener> = Arc::new(CountingListener::default());
        let connection = StreamConnection::new(
            "127.0.0.1:9443".parse().unwrap(),
            "localhost",
            depth_stream_path("BTCUSDT", None),
            Arc::downgrade(&listener),
            ConnectionConfig::default(),
        );
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert_eq!(connection.host(), "127.0.0.1");

        connection.stop();
        connection.stop();

        assert!(!connection.is_running());
        assert_eq!(connection.state(), ConnectionState::Stopped);
        assert!(matches!(connection.start(), Err(MarketDataError::Stopped)));
    }
}
