//! WoT Gateway - HTTP and WebSocket protocol binding for Web of Things devices
//!
//! This library exposes devices described by a thing description as a live
//! network service:
//! - Property reads and writes over plain HTTP
//! - Long-running actions that return a task link clients poll for results
//! - Event subscriptions streamed to any number of WebSocket clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  HTTP / WebSocket                    │
//! │   binder  │  property  │  action  │  event  │ stream │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Interaction core                   │
//! │   ActionTracker  │  SubscriptionRegistry  │  FanOut  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Device trait                      │
//! │   Promise  │  ActionCompletion  │  EventListener     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod api;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod thing;

pub use actions::{ActionCompletion, ActionTracker, TaskSnapshot, TaskStatus};
pub use api::{ApiError, Server, ServerBuilder};
pub use codec::{Codec, CodecError, CodecRegistry, Encoding};
pub use config::Config;
pub use device::{Device, DeviceStatus, EventListener, Promise, Resolver, SimulatedDevice};
pub use error::{Error, Result};
pub use events::{EventFrame, FanOut, SubscriptionRegistry};
pub use thing::{Affordance, DataType, ThingDescription};
