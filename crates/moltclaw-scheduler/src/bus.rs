//! In-process event bus with a fixed set of typed topics.
//!
//! Decouples the engine (decides *when*) from the executor (decides *how*)
//! and broadcasts schedule CRUD to any observer (UI, gateway). Both topics
//! are fire-and-forget: publishing with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::schedule::Schedule;

/// CRUD kind carried on the `schedule:changed` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// `schedule:changed` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleChange {
    pub action: ChangeAction,
    pub schedule_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `schedule:execute` payload — an allowed firing, ready for the executor.
#[derive(Debug, Clone)]
pub struct ExecuteEvent {
    pub schedule_id: String,
    pub schedule: Schedule,
    pub timestamp: DateTime<Utc>,
}

/// Cloneable handle over both topics.
#[derive(Clone)]
pub struct EventBus {
    changed: broadcast::Sender<ScheduleChange>,
    execute: broadcast::Sender<ExecuteEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (changed, _) = broadcast::channel(capacity);
        let (execute, _) = broadcast::channel(capacity);
        Self { changed, execute }
    }

    pub fn publish_change(&self, action: ChangeAction, schedule_id: &str) {
        let _ = self.changed.send(ScheduleChange {
            action,
            schedule_id: schedule_id.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn publish_execute(&self, schedule: Schedule) {
        let _ = self.execute.send(ExecuteEvent {
            schedule_id: schedule.id.clone(),
            schedule,
            timestamp: Utc::now(),
        });
    }

    pub fn subscribe_changed(&self) -> broadcast::Receiver<ScheduleChange> {
        self.changed.subscribe()
    }

    pub fn subscribe_execute(&self) -> broadcast::Receiver<ExecuteEvent> {
        self.execute.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
