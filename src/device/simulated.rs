//! In-memory device backing a thing description
//!
//! Used by the binary to serve descriptions without hardware, and by tests as
//! a fake whose actions can be completed on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Device, DeviceStatus, EventListener, Promise};
use crate::actions::ActionCompletion;
use crate::thing::{DataType, ThingDescription};

/// Device that keeps property values in memory and emits events on demand
#[derive(Debug)]
pub struct SimulatedDevice {
    description: ThingDescription,
    properties: Mutex<HashMap<String, Value>>,
    listeners: Mutex<HashMap<String, Vec<EventListener>>>,
    parked: Mutex<HashMap<String, VecDeque<ActionCompletion>>>,
    action_delay: Option<Duration>,
}

impl SimulatedDevice {
    /// Create a device with every property seeded to its type's zero value
    ///
    /// Actions stay parked until [`Self::complete_next`] is called.
    #[must_use]
    pub fn new(description: ThingDescription) -> Self {
        let properties = description
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.value_type.zero_value()))
            .collect();

        Self {
            description,
            properties: Mutex::new(properties),
            listeners: Mutex::new(HashMap::new()),
            parked: Mutex::new(HashMap::new()),
            action_delay: None,
        }
    }

    /// Complete actions automatically after `delay`
    #[must_use]
    pub const fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    /// Overwrite a property value directly, bypassing writability
    pub fn set_value(&self, name: &str, value: Value) -> bool {
        let mut props = self.properties.lock().unwrap_or_else(PoisonError::into_inner);
        match props.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Settle the oldest parked invocation of `action`
    ///
    /// Returns false if nothing is parked for that action.
    pub fn complete_next(&self, action: &str, outcome: Result<Value, DeviceStatus>) -> bool {
        let completion = self
            .parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(action)
            .and_then(VecDeque::pop_front);

        match completion {
            Some(completion) => {
                completion.complete(outcome);
                true
            }
            None => false,
        }
    }

    /// Number of parked invocations of `action`
    #[must_use]
    pub fn parked_count(&self, action: &str) -> usize {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action)
            .map_or(0, VecDeque::len)
    }

    /// Deliver an event value to every attached listener
    ///
    /// Returns the number of listeners notified.
    pub fn emit(&self, event: &str, value: &Value) -> usize {
        // Clone out so callbacks run without holding the lock
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();

        for listener in &listeners {
            listener.notify(value.clone());
        }
        listeners.len()
    }

    /// Number of listeners attached to `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Emit a sample value for every declared event
    ///
    /// Returns the total number of listeners notified.
    pub fn emit_all(&self, tick: u64) -> usize {
        self.description
            .events
            .iter()
            .map(|ev| self.emit(&ev.name, &sample_value(ev.value_type, tick)))
            .sum()
    }

    /// Call [`Self::emit_all`] every `period` until the task is aborted
    #[must_use]
    pub fn spawn_emitter(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick fires immediately
            ticker.tick().await;

            let mut tick = 0_u64;
            loop {
                ticker.tick().await;
                tick += 1;
                let notified = self.emit_all(tick);
                tracing::trace!(thing = %self.description.name, tick, notified, "simulated events emitted");
            }
        })
    }

    fn park(&self, action: &str, completion: ActionCompletion) {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(action.to_string())
            .or_default()
            .push_back(completion);
    }
}

/// Value of the declared type that changes with `tick`
fn sample_value(ty: DataType, tick: u64) -> Value {
    match ty {
        DataType::Boolean => Value::Bool(tick % 2 == 1),
        DataType::Integer | DataType::Number => Value::from(tick),
        DataType::String => Value::String(format!("tick {tick}")),
        DataType::Array => json!([tick]),
        DataType::Null => Value::Null,
        DataType::Object | DataType::Any => json!({ "tick": tick }),
    }
}

impl Device for SimulatedDevice {
    fn description(&self) -> &ThingDescription {
        &self.description
    }

    fn get_property(&self, name: &str) -> Result<Promise<Value>, DeviceStatus> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .map(Promise::resolved)
            .ok_or_else(|| DeviceStatus::UnknownProperty(name.to_string()))
    }

    fn set_property(&self, name: &str, value: Value) -> Result<Promise<()>, DeviceStatus> {
        let property = self
            .description
            .property(name)
            .ok_or_else(|| DeviceStatus::UnknownProperty(name.to_string()))?;
        if !property.writable {
            return Err(DeviceStatus::ReadOnly(name.to_string()));
        }

        self.set_value(name, value);
        Ok(Promise::resolved(()))
    }

    fn invoke_action(
        &self,
        name: &str,
        input: Value,
        completion: ActionCompletion,
    ) -> Result<(), DeviceStatus> {
        if self.description.action(name).is_none() {
            return Err(DeviceStatus::UnknownAction(name.to_string()));
        }

        let result = json!({ "action": name, "input": input });
        let Some(delay) = self.action_delay else {
            tracing::debug!(action = %name, task_id = %completion.task_id(), "action parked");
            self.park(name, completion);
            return Ok(());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    completion.succeed(result);
                });
            }
            // No runtime to time the delay on
            Err(_) => completion.succeed(result),
        }
        Ok(())
    }

    fn add_listener(&self, event: &str, listener: EventListener) -> Result<(), DeviceStatus> {
        if self.description.event(event).is_none() {
            return Err(DeviceStatus::UnknownEvent(event.to_string()));
        }

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    fn remove_listener(&self, event: &str, listener_id: &str) {
        if let Some(list) = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(event)
        {
            list.retain(|l| l.id() != listener_id);
        }
    }
}
