//! Hook between task mutation code and the burndown engine.
//!
//! Task services hold a [`TaskEventSender`] (or an `Arc<dyn BurndownPort>`)
//! instead of the burndown service itself, so neither side depends on the
//! other at compile time.

use crate::models::{SprintStatus, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub trait BurndownPort: Send + Sync {
    /// Refreshes today's snapshot of `sprint_id`. Never fails the caller;
    /// problems are logged by the implementation.
    fn update_snapshot_on_change(&self, sprint_id: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusChanged {
    pub sprint_id: String,
    pub sprint_status: SprintStatus,
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone)]
pub struct TaskEventSender {
    sender: mpsc::Sender<TaskStatusChanged>,
}

impl TaskEventSender {
    /// Queues the event without waiting. A full or closed channel drops the
    /// event with a warning; the task write itself has already happened.
    pub fn publish(&self, event: TaskStatusChanged) {
        if let Err(error) = self.sender.try_send(event) {
            tracing::warn!(error = %error, "dropped task status event");
        }
    }
}

pub fn task_event_channel(capacity: usize) -> (TaskEventSender, mpsc::Receiver<TaskStatusChanged>) {
    let (sender, receiver) = mpsc::channel::<TaskStatusChanged>(capacity.max(1));
    (TaskEventSender { sender }, receiver)
}

/// Feeds task events into the port until every sender is dropped. Only
/// sprints in progress are refreshed. Resolves to the number of refreshes
/// performed.
pub fn spawn_task_event_listener(
    port: Arc<dyn BurndownPort>,
    mut receiver: mpsc::Receiver<TaskStatusChanged>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut refreshed = 0usize;
        while let Some(event) = receiver.recv().await {
            if event.sprint_status != SprintStatus::InProgress {
                tracing::trace!(sprint_id = %event.sprint_id, "ignoring task event for inactive sprint");
                continue;
            }
            let port = port.clone();
            let sprint_id = event.sprint_id.clone();
            match tokio::task::spawn_blocking(move || port.update_snapshot_on_change(&sprint_id)).await {
                Ok(()) => refreshed += 1,
                Err(error) => {
                    tracing::warn!(sprint_id = %event.sprint_id, error = %error, "snapshot refresh task panicked");
                }
            }
        }
        refreshed
    })
}
