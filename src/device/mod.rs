//! Device boundary
//!
//! The gateway never talks to hardware itself. Everything device-side sits
//! behind the [`Device`] trait: property access hands back a [`Promise`],
//! actions report completion through an [`ActionCompletion`], and events are
//! pushed into registered [`EventListener`] callbacks. Callbacks may fire on
//! any thread, so everything crossing this boundary is `Send + Sync`.

pub mod promise;
pub mod simulated;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::actions::ActionCompletion;
use crate::thing::ThingDescription;

pub use promise::{Promise, Resolver};
pub use simulated::SimulatedDevice;

/// Non-OK status reported by a device operation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// No property with this name
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// No action with this name
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// No event with this name
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Property cannot be written
    #[error("property is read-only: {0}")]
    ReadOnly(String),

    /// Device refused the request
    #[error("rejected by device: {0}")]
    Rejected(String),

    /// Device is not reachable
    #[error("device unavailable")]
    Unavailable,

    /// Producer went away without settling the request
    #[error("device dropped the request")]
    Dropped,
}

impl DeviceStatus {
    /// Stable snake_case code for error payloads
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownProperty(_) => "unknown_property",
            Self::UnknownAction(_) => "unknown_action",
            Self::UnknownEvent(_) => "unknown_event",
            Self::ReadOnly(_) => "read_only",
            Self::Rejected(_) => "rejected",
            Self::Unavailable => "unavailable",
            Self::Dropped => "dropped",
        }
    }

    /// Whether the status means the addressed affordance does not exist
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(
            self,
            Self::UnknownProperty(_) | Self::UnknownAction(_) | Self::UnknownEvent(_)
        )
    }
}

type ListenerCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Device-side event callback, identified so it can be detached later
#[derive(Clone)]
pub struct EventListener {
    id: String,
    callback: ListenerCallback,
}

impl EventListener {
    /// Wrap a callback under the given listener id
    pub fn new(id: impl Into<String>, callback: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            callback: Arc::new(callback),
        }
    }

    /// Listener id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deliver one event value
    pub fn notify(&self, value: Value) {
        (self.callback)(value);
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener").field("id", &self.id).finish_non_exhaustive()
    }
}

/// A thing the gateway can expose
///
/// Calls only start work and return immediately; results arrive through the
/// returned promise, the completion handle or the listener callback.
pub trait Device: Send + Sync {
    /// Schema describing this device's affordances
    fn description(&self) -> &ThingDescription;

    /// Start reading a property
    ///
    /// # Errors
    ///
    /// Returns a non-OK status if the read cannot be started
    fn get_property(&self, name: &str) -> Result<Promise<Value>, DeviceStatus>;

    /// Start writing a property; the promise resolves once acknowledged
    ///
    /// # Errors
    ///
    /// Returns a non-OK status if the write cannot be started
    fn set_property(&self, name: &str, value: Value) -> Result<Promise<()>, DeviceStatus>;

    /// Start an action; `completion` must be settled when it finishes
    ///
    /// # Errors
    ///
    /// Returns a non-OK status if the action cannot be started
    fn invoke_action(
        &self,
        name: &str,
        input: Value,
        completion: ActionCompletion,
    ) -> Result<(), DeviceStatus>;

    /// Attach a listener to an event
    ///
    /// # Errors
    ///
    /// Returns a non-OK status if the event does not exist
    fn add_listener(&self, event: &str, listener: EventListener) -> Result<(), DeviceStatus>;

    /// Detach a listener by id; unknown ids are ignored
    fn remove_listener(&self, event: &str, listener_id: &str);
}
