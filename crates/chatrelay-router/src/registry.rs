//! Connected-client registry
//!
//! Owned by the router task and never shared. Maps each [`ClientKey`] to the
//! sending half of that client's outbound queue.

use bytes::Bytes;
use chatrelay_core::ClientKey;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Sending half of a client's bounded outbound queue.
///
/// Dropping the last one closes the queue, which ends the client's writer.
pub type OutboundQueue = mpsc::Sender<Bytes>;

/// Identifies one accepted connection, even when two share a [`ClientKey`]
pub type ConnectionId = Uuid;

struct Entry {
    id: ConnectionId,
    queue: OutboundQueue,
}

/// Result of offering one payload to every registered queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    /// Queues that took the payload
    pub delivered: usize,
    /// Queues that were full; the payload was dropped for them
    pub dropped: usize,
    /// Queues whose writer has already gone away
    pub closed: usize,
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientKey, Entry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client.
    ///
    /// An existing entry under the same key is replaced and its queue
    /// dropped; the evicted connection's id is returned.
    pub fn insert(
        &mut self,
        key: ClientKey,
        id: ConnectionId,
        queue: OutboundQueue,
    ) -> Option<ConnectionId> {
        self.clients
            .insert(key, Entry { id, queue })
            .map(|previous| previous.id)
    }

    /// Remove a client, dropping its queue.
    ///
    /// Only removes the entry if it still belongs to connection `id`, so a
    /// late departure from an evicted connection leaves its successor alone.
    pub fn remove(&mut self, key: &ClientKey, id: ConnectionId) -> bool {
        match self.clients.get(key) {
            Some(entry) if entry.id == id => {
                self.clients.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.clients.contains_key(key)
    }

    pub fn connection_id(&self, key: &ClientKey) -> Option<ConnectionId> {
        self.clients.get(key).map(|entry| entry.id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ClientKey> {
        self.clients.keys()
    }

    /// Offer `payload` to every queue without waiting on any of them
    pub fn fan_out(&self, payload: &Bytes) -> FanOut {
        let mut result = FanOut::default();

        for entry in self.clients.values() {
            match entry.queue.try_send(payload.clone()) {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(_)) => result.dropped += 1,
                Err(TrySendError::Closed(_)) => result.closed += 1,
            }
        }

        result
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.clients.keys()).finish()
    }
}
