//! Domain events emitted by the engine.
//!
//! Events are fire-and-forget: the engine pushes them into an
//! [`EventSink`] and expects no acknowledgment. Downstream collaborators
//! (notifications, UI refresh) subscribe through the sink.

use crate::types::{EntryId, TaskId, TaskStatus, TransitionRequest, UserId, WorkspaceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A task changed status, whether by user request or scheduler
    /// propagation. The sole trigger for downstream dependency handling.
    #[serde(rename = "task_status_changed")]
    TaskStatusChanged {
        workspace_id: WorkspaceId,
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        requested_by: TransitionRequest,
    },

    /// One per forward-pass batch; lists only tasks whose dates or
    /// status actually changed.
    #[serde(rename = "schedule_recalculated")]
    ScheduleRecalculated {
        workspace_id: WorkspaceId,
        task_ids: Vec<TaskId>,
    },

    /// A running timer was stopped and its entry committed.
    #[serde(rename = "time_entry_closed")]
    TimeEntryClosed {
        workspace_id: WorkspaceId,
        user_id: UserId,
        entry_id: EntryId,
        duration_secs: u64,
    },
}

/// Receives engine events. Implementations must not block the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// In-memory sink that records every event in order.
///
/// Ships as the in-process default and as the test double for asserting
/// on emitted events.
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<Vec<EngineEvent>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.inner.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: EngineEvent) {
        self.inner.lock().push(event);
    }
}

/// Sink that drops everything. Useful when a caller wants no event
/// plumbing at all.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
