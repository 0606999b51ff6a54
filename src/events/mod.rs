//! Event subscriptions and delivery
//!
//! A subscription ties one device event to a [`FanOut`] broadcaster. The
//! device listener publishes [`EventFrame`]s into the broadcaster; each
//! attached streaming session owns one bounded channel out of it.

pub mod fanout;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use fanout::{ClientId, Delivery, FanOut};
pub use registry::SubscriptionRegistry;

/// Default per-client buffer, in frames
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// One event occurrence as pushed to streaming clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    pub timestamp: DateTime<Utc>,
    pub event: Value,
}

impl EventFrame {
    /// Stamp an event value with the current time
    #[must_use]
    pub fn now(event: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
