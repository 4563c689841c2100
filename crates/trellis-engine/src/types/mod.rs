//! Core domain types: ids, task, dependency link, time entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::TaskInvariantError;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(TaskId);
id_newtype!(UserId);
id_newtype!(WorkspaceId);
id_newtype!(ProjectId);
id_newtype!(BoardId);
id_newtype!(SprintId);
id_newtype!(EntryId);

/// Task workflow status.
///
/// `Blocked` is derived by the scheduler and never user-selectable;
/// `Done` and `Cancelled` are terminal for normal flow but can be
/// reopened explicitly back to `Todo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Ready,
    Done,
    Blocked,
    Cancelled,
    Deferred,
}

impl TaskStatus {
    /// Statuses that mean work is being (or has been) performed on the
    /// task. Entering one requires all predecessors to be resolved.
    #[must_use]
    pub fn implies_active_work(self) -> bool {
        matches!(
            self,
            TaskStatus::InProgress | TaskStatus::InReview | TaskStatus::Done
        )
    }

    /// A predecessor in this status no longer holds back its successors.
    #[must_use]
    pub fn resolves_dependencies(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Only the scheduler may move a task into or out of this status.
    #[must_use]
    pub fn is_system_only(self) -> bool {
        matches!(self, TaskStatus::Blocked)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Dependency link semantics between two tasks.
///
/// Both kinds are plain directed edges for cycle detection; they differ
/// only in which predecessor instant constrains the successor's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Successor cannot start before the predecessor's due date.
    FinishToStart,
    /// Successor cannot start before the predecessor's start date.
    StartToStart,
}

/// A directed dependency edge: `target` waits on `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyLink {
    pub source: TaskId,
    pub target: TaskId,
    pub link_type: LinkType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workspace_id: WorkspaceId,
    pub project_id: ProjectId,
    pub board_id: Option<BoardId>,
    pub sprint_id: Option<SprintId>,
    /// Set for subtasks; must never equal `id`.
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_ids: BTreeSet<UserId>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Work estimate in working minutes, consumed by the forward pass.
    pub duration_estimate_min: Option<u32>,
    /// A user-pinned start date is flagged, never silently moved, when
    /// dependencies would push it later.
    pub pinned_start: bool,
}

impl Task {
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, project_id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            workspace_id,
            project_id,
            board_id: None,
            sprint_id: None,
            parent_id: None,
            title: title.into(),
            status: TaskStatus::Todo,
            priority: Priority::default(),
            assignee_ids: BTreeSet::new(),
            start_date: None,
            due_date: None,
            duration_estimate_min: None,
            pinned_start: false,
        }
    }

    #[must_use]
    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Check the data-model invariants. Re-run before every save the
    /// engine performs.
    pub fn validate(&self) -> Result<(), TaskInvariantError> {
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if start > due {
                return Err(TaskInvariantError::StartAfterDue {
                    task_id: self.id,
                    start,
                    due,
                });
            }
        }
        if self.parent_id == Some(self.id) {
            return Err(TaskInvariantError::SelfParent { task_id: self.id });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub project_id: Option<ProjectId>,
    pub task_id: Option<TaskId>,
    pub description: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the timer is running.
    pub end_time: Option<DateTime<Utc>>,
    /// Derived on close and on every edit; never negative.
    pub duration_secs: u64,
    pub billable: bool,
    pub tags: Vec<String>,
}

impl TimeEntry {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Half-open interval intersection: `[a.start, a.end) ∩ [b.start, b.end)`.
    /// Running entries have no interval yet and never overlap anything.
    #[must_use]
    pub fn overlaps(&self, other: &TimeEntry) -> bool {
        match (self.end_time, other.end_time) {
            (Some(self_end), Some(other_end)) => {
                self.start_time < other_end && other.start_time < self_end
            }
            _ => false,
        }
    }
}

/// Who is asking for a status transition.
///
/// System-derived requests come from the scheduler's dependency
/// propagation; they skip the permission oracle and are the only way in
/// or out of [`TaskStatus::Blocked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionRequest {
    UserRequested { actor: UserId },
    SystemDerived,
}

impl TransitionRequest {
    #[must_use]
    pub fn is_system(self) -> bool {
        matches!(self, TransitionRequest::SystemDerived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(start_h: u32, end_h: Option<u32>) -> TimeEntry {
        let at = |h| Utc.with_ymd_and_hms(2024, 3, 4, h, 0, 0).unwrap();
        TimeEntry {
            id: EntryId::new(),
            user_id: UserId::new(),
            workspace_id: WorkspaceId::new(),
            project_id: None,
            task_id: None,
            description: String::new(),
            start_time: at(start_h),
            end_time: end_h.map(at),
            duration_secs: 0,
            billable: false,
            tags: Vec::new(),
        }
    }

    #[test]
    fn touching_boundaries_do_not_overlap() {
        let a = entry(9, Some(10));
        let b = entry(10, Some(11));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn contained_interval_overlaps() {
        let a = entry(9, Some(12));
        let b = entry(10, Some(11));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn running_entry_never_overlaps() {
        let a = entry(9, None);
        let b = entry(9, Some(10));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn start_after_due_rejected() {
        let mut task = Task::new(WorkspaceId::new(), ProjectId::new(), "t");
        task.start_date = Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        task.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        assert!(task.validate().is_err());
    }

    #[test]
    fn self_parent_rejected() {
        let mut task = Task::new(WorkspaceId::new(), ProjectId::new(), "t");
        task.parent_id = Some(task.id);
        assert!(task.validate().is_err());
    }
}
