//! Main router implementation
//!
//! The router runs as exactly one task. It owns the [`ClientRegistry`] and
//! the [`LogSink`], and reacts to three event streams:
//!
//! - registrations (a connection joined)
//! - departures (a connection left)
//! - messages (a connection sent a chat line)
//!
//! Events are handled one at a time, so every fan-out sees the registry
//! exactly as the preceding registrations and departures left it. Streams
//! are multiplexed with an unbiased `select!`: FIFO within a stream, no
//! fixed order across streams.
//!
//! # Example
//!
//! ```no_run
//! use chatrelay_router::{MemoryLogSink, Router, RouterConfig};
//!
//! # async fn example() {
//! let (handle, task) = Router::new(MemoryLogSink::new()).spawn(&RouterConfig::default());
//! assert_eq!(handle.client_count(), 0);
//! drop(handle);
//! task.await.unwrap();
//! # }
//! ```

use chatrelay_core::{
    ChatMessage, ClientKey, DEFAULT_EVENT_CAPACITY, DEFAULT_QUEUE_CAPACITY, MAX_PAYLOAD_SIZE,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, RouterError},
    log_sink::LogSink,
    registry::{ClientRegistry, ConnectionId, FanOut, OutboundQueue},
};

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Capacity of each client's outbound queue
    pub queue_capacity: usize,
    /// Capacity of each of the router's three event streams
    pub event_capacity: usize,
    /// Largest inbound frame payload accepted from a client
    pub max_payload_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl RouterConfig {
    /// Reject configurations the router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(RouterError::Config("queue_capacity must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(RouterError::Config("event_capacity must be at least 1".into()));
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(RouterError::Config(format!(
                "max_payload_size must be between 1 and {}",
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(())
    }
}

/// Counters published by the router task
#[derive(Debug, Default)]
pub struct RouterStats {
    clients: AtomicUsize,
    accepted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    log_failures: AtomicU64,
}

impl RouterStats {
    /// Currently registered clients
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Messages accepted since start
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Payloads handed to outbound queues
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Payloads discarded because a queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Log appends that failed
    pub fn log_failures(&self) -> u64 {
        self.log_failures.load(Ordering::Relaxed)
    }
}

struct RegisterEvent {
    key: ClientKey,
    id: ConnectionId,
    queue: OutboundQueue,
    ack: oneshot::Sender<()>,
}

struct DeregisterEvent {
    key: ClientKey,
    id: ConnectionId,
}

/// chatrelay router
pub struct Router {
    registry: ClientRegistry,
    sink: Box<dyn LogSink>,
    stats: Arc<RouterStats>,
}

impl Router {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            registry: ClientRegistry::new(),
            sink: Box::new(sink),
            stats: Arc::new(RouterStats::default()),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Add a client. A client already registered under `key` is evicted:
    /// its queue is dropped, which ends its writer.
    pub fn register(&mut self, key: ClientKey, id: ConnectionId, queue: OutboundQueue) {
        if let Some(previous) = self.registry.insert(key.clone(), id, queue) {
            warn!(client = %key, evicted = %previous, "Duplicate client key, replacing earlier connection");
        }
        self.stats.clients.store(self.registry.len(), Ordering::Relaxed);
        info!(client = %key, clients = self.registry.len(), "Client connected");
    }

    /// Remove a client and close its queue. Unknown keys are ignored.
    pub fn deregister(&mut self, key: &ClientKey, id: ConnectionId) -> bool {
        let removed = self.registry.remove(key, id);
        if removed {
            self.stats.clients.store(self.registry.len(), Ordering::Relaxed);
            info!(client = %key, clients = self.registry.len(), "Client disconnected");
        } else {
            debug!(client = %key, "Departure for unregistered connection ignored");
        }
        removed
    }

    /// Log a message, then offer it to every registered client, sender
    /// included. Never waits on a client queue.
    pub async fn accept(&mut self, message: ChatMessage) -> FanOut {
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.sink.append(&message.log_line()).await {
            self.stats.log_failures.fetch_add(1, Ordering::Relaxed);
            error!(client = %message.sender, error = %e, "Failed to append to message log");
        }

        let result = self.registry.fan_out(&message.text);
        self.stats
            .delivered
            .fetch_add(result.delivered as u64, Ordering::Relaxed);

        if result.dropped > 0 {
            self.stats
                .dropped
                .fetch_add(result.dropped as u64, Ordering::Relaxed);
            debug!(
                client = %message.sender,
                dropped = result.dropped,
                "Outbound queues full, message dropped for slow clients"
            );
        }

        result
    }

    /// Move the router onto its own task.
    ///
    /// The task runs until every [`RouterHandle`] and [`Registration`] is
    /// gone.
    pub fn spawn(self, config: &RouterConfig) -> (RouterHandle, JoinHandle<()>) {
        let (registrations_tx, registrations_rx) = mpsc::channel(config.event_capacity);
        let (departures_tx, departures_rx) = mpsc::channel(config.event_capacity);
        let (messages_tx, messages_rx) = mpsc::channel(config.event_capacity);

        let handle = RouterHandle {
            registrations: registrations_tx,
            departures: departures_tx,
            messages: messages_tx,
            stats: Arc::clone(&self.stats),
            config: config.clone(),
        };

        let task = tokio::spawn(self.run(registrations_rx, departures_rx, messages_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut registrations: mpsc::Receiver<RegisterEvent>,
        mut departures: mpsc::Receiver<DeregisterEvent>,
        mut messages: mpsc::Receiver<ChatMessage>,
    ) {
        info!("Router started");

        loop {
            tokio::select! {
                Some(event) = registrations.recv() => {
                    let RegisterEvent { key, id, queue, ack } = event;
                    self.register(key.clone(), id, queue);
                    // Registrant gave up waiting; nobody will ever depart for it
                    if ack.send(()).is_err() {
                        self.deregister(&key, id);
                    }
                }
                Some(event) = departures.recv() => {
                    self.deregister(&event.key, event.id);
                }
                Some(message) = messages.recv() => {
                    self.accept(message).await;
                }
                else => break,
            }
        }

        info!("Router stopped");
    }
}

/// Cloneable entry point to a running router
#[derive(Clone)]
pub struct RouterHandle {
    registrations: mpsc::Sender<RegisterEvent>,
    departures: mpsc::Sender<DeregisterEvent>,
    messages: mpsc::Sender<ChatMessage>,
    stats: Arc<RouterStats>,
    config: RouterConfig,
}

impl RouterHandle {
    /// Register a client and wait until the router has processed it.
    ///
    /// The returned guard deregisters the client when released or dropped.
    pub async fn register(&self, key: ClientKey, queue: OutboundQueue) -> Result<Registration> {
        let id = Uuid::new_v4();
        let (ack_tx, ack_rx) = oneshot::channel();

        self.registrations
            .send(RegisterEvent {
                key: key.clone(),
                id,
                queue,
                ack: ack_tx,
            })
            .await
            .map_err(|_| RouterError::RouterClosed)?;

        // The event is in flight, so a caller cancelled from here on still
        // owes the router a departure
        let registration = Registration {
            key,
            id,
            departures: self.departures.clone(),
            released: false,
        };

        ack_rx.await.map_err(|_| RouterError::RouterClosed)?;

        Ok(registration)
    }

    /// Hand a message to the router, waiting for room in the message stream
    pub async fn submit(&self, message: ChatMessage) -> Result<()> {
        self.messages
            .send(message)
            .await
            .map_err(|_| RouterError::RouterClosed)
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Get client count
    pub fn client_count(&self) -> usize {
        self.stats.clients()
    }

    /// True once the router task has stopped
    pub fn is_closed(&self) -> bool {
        self.messages.is_closed()
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("config", &self.config)
            .field("clients", &self.stats.clients())
            .finish()
    }
}

/// A client's place in the registry.
///
/// Deregistration happens exactly once: through [`release`](Self::release)
/// on the normal path, or from `Drop` if the owner unwinds or is cancelled.
pub struct Registration {
    key: ClientKey,
    id: ConnectionId,
    departures: mpsc::Sender<DeregisterEvent>,
    released: bool,
}

impl Registration {
    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Deregister, waiting for room in the departure stream
    pub async fn release(mut self) {
        let event = DeregisterEvent {
            key: self.key.clone(),
            id: self.id,
        };
        if self.departures.send(event).await.is_ok() {
            self.released = true;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let event = DeregisterEvent {
            key: self.key.clone(),
            id: self.id,
        };

        match self.departures.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let departures = self.departures.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(async move {
                            let _ = departures.send(event).await;
                        });
                    }
                    Err(_) => {
                        warn!(client = %self.key, "Departure lost: no runtime to deliver it");
                    }
                }
            }
            // Router is gone and the registry with it
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
