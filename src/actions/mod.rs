//! Action execution tracking
//!
//! Invoking an action hands the device an [`ActionCompletion`] and returns a
//! task id straight away. The device settles the completion whenever the
//! action finishes, from whatever thread it likes; clients poll the task id
//! in the meantime and get the slot's current contents without blocking.
//!
//! Slots are never evicted, so the tracker grows with every invocation for
//! the lifetime of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::device::DeviceStatus;

/// Current state of an action task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Still running
    Pending,
    /// Finished successfully
    Done { result: Value },
    /// Finished with an error
    Failed { error: String },
}

impl TaskStatus {
    /// Whether the task has finished, either way
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Poll response for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub action: String,
    #[serde(flatten)]
    pub status: TaskStatus,
}

/// One-shot result cell for a single invocation
#[derive(Debug)]
struct TaskSlot {
    /// Base path of the thing the action was invoked on
    thing: String,
    action: String,
    /// Set once the device has accepted the invocation
    accepted: AtomicBool,
    state: watch::Sender<TaskStatus>,
}

impl TaskSlot {
    fn new(thing: &str, action: &str) -> Self {
        Self {
            thing: thing.to_string(),
            action: action.to_string(),
            accepted: AtomicBool::new(false),
            state: watch::channel(TaskStatus::Pending).0,
        }
    }

    fn owned_by(&self, thing: &str, action: &str) -> bool {
        self.thing == thing && self.action == action
    }

    /// Move from Pending to a final state; later attempts are ignored
    fn settle(&self, status: TaskStatus) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_settled() {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    fn snapshot(&self) -> TaskStatus {
        self.state.borrow().clone()
    }
}

/// Completion callback handed to the device for one invocation
///
/// Consumed on completion, so it fires at most once. Dropping it unsettled
/// marks the task as failed rather than leaving it pending forever.
#[derive(Debug)]
pub struct ActionCompletion {
    task_id: String,
    slot: Option<Arc<TaskSlot>>,
}

impl ActionCompletion {
    /// Id of the task this completion settles
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Name of the invoked action
    #[must_use]
    pub fn action(&self) -> &str {
        self.slot.as_ref().map_or("", |slot| slot.action.as_str())
    }

    /// Record the action's outcome
    pub fn complete(mut self, outcome: Result<Value, DeviceStatus>) {
        let Some(slot) = self.slot.take() else {
            return;
        };

        let status = match outcome {
            Ok(result) => TaskStatus::Done { result },
            Err(status) => TaskStatus::Failed {
                error: status.to_string(),
            },
        };

        if slot.settle(status) {
            tracing::debug!(task_id = %self.task_id, action = %slot.action, "action task settled");
        }
    }

    /// Record a successful result
    pub fn succeed(self, result: Value) {
        self.complete(Ok(result));
    }

    /// Record a failure
    pub fn fail(self, status: DeviceStatus) {
        self.complete(Err(status));
    }
}

/// What dropping a completion did to its task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abandoned {
    /// Already settled, nothing changed
    No,
    /// Dropped while the device was still deciding whether to start
    BeforeStart,
    /// Dropped after the device accepted the invocation
    AfterStart,
}

impl ActionCompletion {
    fn abandon(&mut self) -> Abandoned {
        let Some(slot) = self.slot.take() else {
            return Abandoned::No;
        };
        let abandoned = TaskStatus::Failed {
            error: "action abandoned".to_string(),
        };
        if !slot.settle(abandoned) {
            return Abandoned::No;
        }

        // A device refusing to start drops the completion; the caller reports that
        if slot.accepted.load(Ordering::Acquire) {
            tracing::warn!(task_id = %self.task_id, action = %slot.action, "action completion dropped unsettled");
            Abandoned::AfterStart
        } else {
            tracing::debug!(task_id = %self.task_id, action = %slot.action, "action completion dropped before start");
            Abandoned::BeforeStart
        }
    }
}

impl Drop for ActionCompletion {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Registry of action tasks keyed by task id
#[derive(Debug, Default)]
pub struct ActionTracker {
    slots: Mutex<HashMap<String, Arc<TaskSlot>>>,
}

impl ActionTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a pending task for `action` on the thing mounted at `thing`
    ///
    /// Returns the new task id and the completion to hand to the device.
    pub fn create_slot(&self, thing: &str, action: &str) -> (String, ActionCompletion) {
        let task_id = Uuid::new_v4().to_string();
        let slot = Arc::new(TaskSlot::new(thing, action));

        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.clone(), Arc::clone(&slot));

        let completion = ActionCompletion {
            task_id: task_id.clone(),
            slot: Some(slot),
        };
        (task_id, completion)
    }

    fn slot(&self, task_id: &str) -> Option<Arc<TaskSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Current contents of a task, without waiting
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.slot(task_id).map(|slot| TaskSnapshot {
            id: task_id.to_string(),
            action: slot.action.clone(),
            status: slot.snapshot(),
        })
    }

    /// Current contents of a task, only if it was started by `action` on
    /// the thing mounted at `thing`
    #[must_use]
    pub fn get_for(&self, thing: &str, action: &str, task_id: &str) -> Option<TaskSnapshot> {
        let slot = self.slot(task_id).filter(|slot| slot.owned_by(thing, action))?;
        Some(TaskSnapshot {
            id: task_id.to_string(),
            action: slot.action.clone(),
            status: slot.snapshot(),
        })
    }

    /// Record that the device accepted the invocation
    ///
    /// From here on a completion dropped unsettled is reported as abandoned.
    pub fn accept(&self, task_id: &str) {
        if let Some(slot) = self.slot(task_id) {
            slot.accepted.store(true, Ordering::Release);
        }
    }

    /// Forget a task whose start was rejected by the device
    pub fn discard(&self, task_id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id)
            .is_some()
    }

    /// Wait until a task settles
    ///
    /// Returns `None` for unknown task ids.
    pub async fn wait(&self, task_id: &str) -> Option<TaskStatus> {
        let slot = self.slot(task_id)?;
        let mut rx = slot.state.subscribe();
        // The sender lives in the slot we hold, so this cannot fail
        let settled = rx.wait_for(TaskStatus::is_settled).await.ok()?;
        Some(settled.clone())
    }

    /// Number of tracked tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no task has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
