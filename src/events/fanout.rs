//! Multicast to a dynamic set of bounded channels

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Client id, unique within one broadcaster
pub type ClientId = u64;

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Clients that accepted the item
    pub delivered: usize,
    /// Clients whose buffer was full; the item was dropped for them
    pub dropped: usize,
    /// Clients found disconnected and pruned
    pub closed: usize,
}

#[derive(Debug)]
struct Clients<T> {
    next_id: ClientId,
    senders: BTreeMap<ClientId, mpsc::Sender<T>>,
}

/// Broadcaster that copies every published item to each attached channel
///
/// Publishing never waits: a client whose buffer is full misses the item and
/// everyone else still gets it.
#[derive(Debug)]
pub struct FanOut<T> {
    clients: Mutex<Clients<T>>,
}

impl<T: Clone> FanOut<T> {
    /// Create a broadcaster with no clients
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clients: Mutex::new(Clients {
                next_id: 0,
                senders: BTreeMap::new(),
            }),
        }
    }

    /// Attach a channel and return its id
    pub fn add_subscriber(&self, sender: mpsc::Sender<T>) -> ClientId {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let id = clients.next_id;
        clients.next_id += 1;
        clients.senders.insert(id, sender);
        id
    }

    /// Detach one channel; its receiver sees the channel close
    pub fn remove_subscriber(&self, id: ClientId) -> bool {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .remove(&id)
            .is_some()
    }

    /// Detach every channel, returning how many were attached
    pub fn remove_all_subscribers(&self) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = clients.senders.len();
        clients.senders.clear();
        removed
    }

    /// Send `item` to every attached channel
    pub fn publish(&self, item: &T) -> Delivery {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivery = Delivery::default();
        let mut gone = Vec::new();

        for (&id, sender) in &clients.senders {
            match sender.try_send(item.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    delivery.dropped += 1;
                    tracing::warn!(client_id = id, "client buffer full, dropping item");
                }
                Err(TrySendError::Closed(_)) => gone.push(id),
            }
        }

        for id in gone {
            clients.senders.remove(&id);
            delivery.closed += 1;
            tracing::debug!(client_id = id, "pruned closed client");
        }

        delivery
    }

    /// Number of attached channels
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).senders.len()
    }
}

impl<T: Clone> Default for FanOut<T> {
    fn default() -> Self {
        Self::new()
    }
}
