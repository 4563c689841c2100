//! Testing utilities for the Trellis workspace
//!
//! Shared fixtures: a manual clock, permission oracles, and a fully
//! wired engine over the in-memory store.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use trellis_engine::calendar::WeekdayCalendar;
use trellis_engine::clock::Clock;
use trellis_engine::engine::{Collaborators, PermissionOracle, WorkflowEngine};
use trellis_engine::events::{EventLog, EventSink};
use trellis_engine::store::{MemoryStore, TaskStore, TimeEntryStore};
use trellis_engine::types::{ProjectId, Task, TaskStatus, UserId, WorkspaceId};

/// Clock that only moves when a test tells it to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Monday 2024-03-04 09:00 UTC, inside the standard working window.
    #[must_use]
    pub fn workday_morning() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn may_set_status(&self, _actor: UserId, _task: &Task, _to: TaskStatus) -> bool {
        true
    }
}

pub struct DenyAll;

impl PermissionOracle for DenyAll {
    fn may_set_status(&self, _actor: UserId, _task: &Task, _to: TaskStatus) -> bool {
        false
    }
}

/// A fully wired engine plus handles to its in-memory collaborators.
pub struct TestHarness {
    pub engine: WorkflowEngine,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<EventLog>,
    pub workspace: WorkspaceId,
    pub project: ProjectId,
    pub actor: UserId,
}

impl TestHarness {
    /// Engine over the in-memory store with an allow-all oracle and the
    /// standard weekday calendar.
    #[must_use]
    pub fn new() -> Self {
        Self::with_oracle(Arc::new(AllowAll))
    }

    #[must_use]
    pub fn with_oracle(permissions: Arc<dyn PermissionOracle>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::workday_morning());
        let events = Arc::new(EventLog::new());
        let engine = WorkflowEngine::new(Collaborators {
            tasks: Arc::clone(&store) as Arc<dyn TaskStore>,
            entries: Arc::clone(&store) as Arc<dyn TimeEntryStore>,
            calendar: Arc::new(WeekdayCalendar::standard()),
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
            permissions,
            sink: Arc::clone(&events) as Arc<dyn EventSink>,
        });
        Self {
            engine,
            store,
            clock,
            events,
            workspace: WorkspaceId::new(),
            project: ProjectId::new(),
            actor: UserId::new(),
        }
    }

    /// Seed a task in the harness workspace and return it.
    pub fn seed_task(&self, title: &str) -> Task {
        let task = Task::new(self.workspace, self.project, title);
        self.store.insert_task(task.clone());
        task
    }

    /// Seed a task with a work estimate, in minutes.
    pub fn seed_estimated_task(&self, title: &str, estimate_min: u32) -> Task {
        let mut task = Task::new(self.workspace, self.project, title);
        task.duration_estimate_min = Some(estimate_min);
        self.store.insert_task(task.clone());
        task
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
