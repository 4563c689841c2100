//! Error taxonomy for the workflow engine.
//!
//! One enum per component, collected under [`EngineError`]. All
//! validation failures are returned synchronously to the caller; the
//! engine never auto-corrects a rejected mutation.

use crate::types::{EntryId, TaskId, TaskStatus, UserId, WorkspaceId};
use chrono::{DateTime, Utc};

/// Data-model invariant violations on a single task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskInvariantError {
    #[error("task {task_id}: start date {start} is after due date {due}")]
    StartAfterDue {
        task_id: TaskId,
        start: DateTime<Utc>,
        due: DateTime<Utc>,
    },

    #[error("task {task_id} cannot be its own parent")]
    SelfParent { task_id: TaskId },
}

/// Status transition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The transition table has no edge `from -> to`, or the target
    /// status is system-only and the request came from a user.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// The target status implies active work while predecessors remain
    /// unresolved.
    #[error("task {task_id}: {unresolved} predecessor(s) not yet resolved")]
    DependencyUnresolved { task_id: TaskId, unresolved: usize },

    /// The permission oracle answered no.
    #[error("actor {actor} may not set status {to:?}")]
    PermissionDenied { actor: UserId, to: TaskStatus },
}

/// Dependency graph mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    /// Adding the edge would create a cycle. The graph is unchanged.
    #[error("link would create a dependency cycle")]
    CycleDetected,

    #[error("task {0} is not in the dependency graph")]
    TaskNotFound(TaskId),

    #[error("no link from {from} to {target}")]
    LinkNotFound { from: TaskId, target: TaskId },

    /// Task graphs are scoped to one workspace; links may not span two.
    #[error("tasks {from} and {target} belong to different workspaces")]
    CrossWorkspaceLink { from: TaskId, target: TaskId },
}

/// Time tracking failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("user {0} already has a running timer")]
    TimerAlreadyRunning(UserId),

    #[error("user {0} has no running timer")]
    NoRunningTimer(UserId),

    /// The candidate interval intersects an existing closed entry.
    #[error("interval overlaps existing entry {conflict}")]
    OverlappingEntry { conflict: EntryId },

    #[error("end time {end} is not after start time {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found in store")]
    TaskNotFound(TaskId),

    #[error("time entry {0} not found in store")]
    EntryNotFound(EntryId),

    /// Conditional insert refused: the user already holds an open entry.
    #[error("user {0} already has an open entry")]
    RunningEntryExists(UserId),

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Umbrella error for every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("time tracking error: {0}")]
    Time(#[from] TimeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("task invariant violated: {0}")]
    Invariant(#[from] TaskInvariantError),

    /// A cycle surfaced during a routine recompute, i.e. outside
    /// `add_link`. The persisted link set is corrupt; operator
    /// intervention required, the engine will not guess a repair.
    #[error("dependency graph for workspace {0} is corrupt (cycle found during recompute)")]
    GraphCorrupted(WorkspaceId),
}

impl EngineError {
    /// Integrity faults are not ordinary validation rejections: they mean
    /// persisted state violates an invariant the engine maintains.
    #[must_use]
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, EngineError::GraphCorrupted(_))
    }
}
