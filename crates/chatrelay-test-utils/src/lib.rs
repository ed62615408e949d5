//! Common test helpers for chatrelay tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - In-process transport doubles
//! - A fully wired relay on an ephemeral port

use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_router::{MemoryLogSink, RelayServer, Router, RouterConfig, RouterHandle};
use chatrelay_transport::{Result as TransportResult, TransportError, TransportSender};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
    }
    check()
}

// ============================================================================
// Transport Doubles
// ============================================================================

/// A `TransportSender` that forwards every payload into a channel
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Bytes>,
    connected: Arc<AtomicBool>,
}

impl ChannelSender {
    /// Create a sender and the receiver that observes what it "wrote"
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            tx,
            connected: Arc::new(AtomicBool::new(true)),
        };
        (sender, rx)
    }

    /// Flag that can be flipped to make subsequent sends fail
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }
}

#[async_trait]
impl TransportSender for ChannelSender {
    async fn send(&mut self, data: Bytes) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A `TransportSender` whose every send fails
pub struct FailingSender;

#[async_trait]
impl TransportSender for FailingSender {
    async fn send(&mut self, _data: Bytes) -> TransportResult<()> {
        Err(TransportError::SendFailed("peer gone".into()))
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

// ============================================================================
// Test Relay
// ============================================================================

/// A relay serving on an ephemeral local port with an in-memory log
pub struct TestRelay {
    pub addr: SocketAddr,
    pub router: RouterHandle,
    pub log: MemoryLogSink,
    pub static_dir: tempfile::TempDir,
    server: JoinHandle<()>,
}

impl TestRelay {
    /// Start a relay with default router configuration
    pub async fn start() -> Self {
        Self::start_with_config(RouterConfig::default()).await
    }

    /// Start a relay with the given router configuration
    pub async fn start_with_config(config: RouterConfig) -> Self {
        let log = MemoryLogSink::new();
        let (router, _task) = Router::new(log.clone()).spawn(&config);

        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("index.html"), "<html>chat</html>").unwrap();
        std::fs::write(static_dir.path().join("index.js"), "// chat client").unwrap();

        let server = RelayServer::bind("127.0.0.1:0", router.clone(), static_dir.path())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let _ = server.serve().await;
        });

        Self {
            addr,
            router,
            log,
            static_dir,
            server,
        }
    }

    /// WebSocket endpoint URL
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait until exactly `count` clients are registered
    pub async fn wait_for_clients(&self, count: usize) -> bool {
        wait_for(|| self.router.client_count() == count, DEFAULT_TIMEOUT).await
    }

    /// Wait until the log holds at least `count` lines
    pub async fn wait_for_log_lines(&self, count: usize) -> bool {
        wait_for(|| self.log.lines().len() >= count, DEFAULT_TIMEOUT).await
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.server.abort();
    }
}
