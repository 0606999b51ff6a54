//! Streaming client session
//!
//! One session per WebSocket connection. The session attaches a bounded
//! channel to its subscription's broadcaster and pushes every frame it
//! receives to the socket as JSON text. It ends when a send fails, or when
//! the subscription is cancelled and the channel closes. Push only: nothing
//! the client sends is read.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;

use super::{ApiError, ThingState};
use crate::events::{ClientId, EventFrame, SubscriptionRegistry};

/// `GET {base}/{href}/ws/{subscriptionID}`
///
/// The subscription is checked before the upgrade request itself, so an
/// unknown id is a plain 404 whether or not upgrade headers were sent.
pub async fn upgrade(
    thing: Arc<ThingState>,
    event: String,
    subscription_id: String,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let registry = Arc::clone(&thing.server.subscriptions);
    if !registry.is_owned(&subscription_id, &thing.base, &event).await {
        return ApiError::NotFound(format!("no subscription {subscription_id} for event {event}"))
            .into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let buffer = thing.server.stream_buffer;
    ws.on_upgrade(move |socket| StreamSession::new(registry, subscription_id, buffer).run(socket))
}

/// Per-connection push loop
#[derive(Debug)]
pub struct StreamSession {
    registry: Arc<SubscriptionRegistry>,
    subscription_id: String,
    buffer: usize,
    client: Option<ClientId>,
}

impl StreamSession {
    /// Create an unattached session for a subscription
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>, subscription_id: String, buffer: usize) -> Self {
        Self {
            registry,
            subscription_id,
            buffer: buffer.max(1),
            client: None,
        }
    }

    /// Client id once attached
    #[must_use]
    pub const fn client_id(&self) -> Option<ClientId> {
        self.client
    }

    /// Attach to the subscription's broadcaster
    ///
    /// Returns `None` if the subscription is gone.
    pub async fn attach(&mut self) -> Option<mpsc::Receiver<EventFrame>> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let client = self.registry.add_client(&self.subscription_id, tx).await?;
        self.client = Some(client);
        tracing::info!(subscription_id = %self.subscription_id, client_id = client, "stream client attached");
        Some(rx)
    }

    /// Push frames from `frames` into `sink` until either side gives out
    pub async fn forward<S>(mut self, mut frames: mpsc::Receiver<EventFrame>, sink: &mut S)
    where
        S: Sink<Message> + Unpin,
    {
        while let Some(frame) = frames.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(subscription_id = %self.subscription_id, error = %e, "failed to encode event frame");
                    continue;
                }
            };

            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(subscription_id = %self.subscription_id, "stream send failed");
                self.detach().await;
                return;
            }
        }

        // Broadcaster dropped our sender: the subscription was cancelled
        self.client = None;
        let _ = sink.send(Message::Close(None)).await;
        tracing::info!(subscription_id = %self.subscription_id, "stream closed by cancel");
    }

    /// Attach and forward over a live WebSocket
    pub async fn run(mut self, mut socket: WebSocket) {
        let Some(frames) = self.attach().await else {
            tracing::debug!(subscription_id = %self.subscription_id, "subscription gone before attach");
            let _ = SinkExt::send(&mut socket, Message::Close(None)).await;
            return;
        };
        self.forward(frames, &mut socket).await;
    }

    async fn detach(&mut self) {
        if let Some(client) = self.client.take() {
            self.registry.remove_client(&self.subscription_id, client).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crate::thing::ThingDescription;
    use futures::StreamExt;
    use futures::channel::mpsc as sink_channel;
    use serde_json::json;

    fn doorbell() -> Arc<SimulatedDevice> {
        let td = ThingDescription::from_json(r#"{"name": "doorbell", "events": [{"name": "ring"}]}"#)
            .unwrap();
        Arc::new(SimulatedDevice::new(td))
    }

    #[tokio::test]
    async fn pushes_frames_and_closes_on_cancel() {
        let device = doorbell();
        let registry = Arc::new(SubscriptionRegistry::new());
        let id = registry.subscribe(device.clone(), "/doorbell", "ring").await.unwrap();

        let mut session = StreamSession::new(Arc::clone(&registry), id.clone(), 8);
        let frames = session.attach().await.unwrap();
        assert!(session.client_id().is_some());

        let (mut tx, mut rx) = sink_channel::unbounded::<Message>();
        let task = tokio::spawn(async move { session.forward(frames, &mut tx).await });

        device.emit("ring", &json!({"floor": 2}));
        let Some(Message::Text(text)) = rx.next().await else {
            panic!("expected a text frame");
        };
        let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(frame["event"], json!({"floor": 2}));
        assert!(frame["timestamp"].is_string());

        assert!(registry.cancel(&id).await);
        assert!(matches!(rx.next().await, Some(Message::Close(None))));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_send_detaches_client() {
        let device = doorbell();
        let registry = Arc::new(SubscriptionRegistry::new());
        let id = registry.subscribe(device.clone(), "/doorbell", "ring").await.unwrap();

        let mut session = StreamSession::new(Arc::clone(&registry), id.clone(), 8);
        let frames = session.attach().await.unwrap();
        assert_eq!(registry.client_count(&id).await, Some(1));

        let (mut tx, rx) = sink_channel::unbounded::<Message>();
        drop(rx);

        device.emit("ring", &json!(null));
        session.forward(frames, &mut tx).await;

        assert_eq!(registry.client_count(&id).await, Some(0));
        assert!(registry.contains(&id).await);
    }

    #[tokio::test]
    async fn attach_to_cancelled_subscription_fails() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let id = registry.subscribe(doorbell(), "/doorbell", "ring").await.unwrap();
        registry.cancel(&id).await;

        let mut session = StreamSession::new(registry, id, 8);
        assert!(session.attach().await.is_none());
        assert!(session.client_id().is_none());
    }
}
