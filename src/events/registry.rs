//! Subscription id to broadcaster map
//!
//! Creating and cancelling a subscription take the write lock; attaching and
//! detaching streaming clients take the read lock and then work on the
//! broadcaster's own client set. Device callbacks publish straight into the
//! broadcaster and never touch this lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::{ClientId, EventFrame, FanOut};
use crate::device::{Device, DeviceStatus, EventListener};

struct Subscription {
    /// Base path of the thing the subscription was created on
    thing: String,
    event: String,
    fanout: Arc<FanOut<EventFrame>>,
    device: Arc<dyn Device>,
}

impl Subscription {
    fn owned_by(&self, thing: &str, event: &str) -> bool {
        self.thing == thing && self.event == event
    }
}

/// Live event subscriptions keyed by subscription id
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event` on `device`, mounted at `thing`
    ///
    /// The device listener is registered under the subscription id, so each
    /// subscription owns exactly one listener.
    ///
    /// # Errors
    ///
    /// Returns the device status if the listener could not be attached
    pub async fn subscribe(
        &self,
        device: Arc<dyn Device>,
        thing: &str,
        event: &str,
    ) -> Result<String, DeviceStatus> {
        let id = Uuid::new_v4().to_string();
        let fanout = Arc::new(FanOut::new());

        let sink = Arc::clone(&fanout);
        let listener = EventListener::new(id.clone(), move |value: Value| {
            sink.publish(&EventFrame::now(value));
        });
        device.add_listener(event, listener)?;

        self.entries.write().await.insert(
            id.clone(),
            Subscription {
                thing: thing.to_string(),
                event: event.to_string(),
                fanout,
                device,
            },
        );

        tracing::info!(subscription_id = %id, thing = %thing, event = %event, "subscription created");
        Ok(id)
    }

    /// Cancel a subscription, closing every attached client
    ///
    /// Returns false if the id is unknown or already cancelled.
    pub async fn cancel(&self, id: &str) -> bool {
        self.cancel_where(id, |_| true).await
    }

    /// Cancel a subscription only if it was created for `event` on the
    /// thing mounted at `thing`
    ///
    /// Returns false if there is no such subscription; others are untouched.
    pub async fn cancel_owned(&self, id: &str, thing: &str, event: &str) -> bool {
        self.cancel_where(id, |s| s.owned_by(thing, event)).await
    }

    async fn cancel_where(&self, id: &str, matches: impl FnOnce(&Subscription) -> bool) -> bool {
        let mut entries = self.entries.write().await;
        if !entries.get(id).is_some_and(matches) {
            return false;
        }
        let Some(subscription) = entries.remove(id) else {
            return false;
        };

        // Clients, listener and entry all go under the one write lock
        let closed = subscription.fanout.remove_all_subscribers();
        subscription.device.remove_listener(&subscription.event, id);
        drop(entries);

        tracing::info!(
            subscription_id = %id,
            thing = %subscription.thing,
            event = %subscription.event,
            clients = closed,
            "subscription cancelled"
        );
        true
    }

    /// Attach a streaming client's channel
    ///
    /// Returns `None` if the subscription does not exist.
    pub async fn add_client(&self, id: &str, sender: mpsc::Sender<EventFrame>) -> Option<ClientId> {
        let entries = self.entries.read().await;
        let client = entries.get(id)?.fanout.add_subscriber(sender);
        tracing::debug!(subscription_id = %id, client_id = client, "client attached");
        Some(client)
    }

    /// Detach a streaming client
    pub async fn remove_client(&self, id: &str, client: ClientId) -> bool {
        let entries = self.entries.read().await;
        let removed = entries
            .get(id)
            .is_some_and(|s| s.fanout.remove_subscriber(client));
        if removed {
            tracing::debug!(subscription_id = %id, client_id = client, "client detached");
        }
        removed
    }

    /// Whether a subscription exists
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Number of clients attached to a subscription
    pub async fn client_count(&self, id: &str) -> Option<usize> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|s| s.fanout.subscriber_count())
    }

    /// Whether a subscription exists for `event` on the thing mounted at
    /// `thing`
    pub async fn is_owned(&self, id: &str, thing: &str, event: &str) -> bool {
        self.entries
            .read()
            .await
            .get(id)
            .is_some_and(|s| s.owned_by(thing, event))
    }

    /// Number of live subscriptions
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether there are no live subscriptions
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Ids of all live subscriptions
    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}
