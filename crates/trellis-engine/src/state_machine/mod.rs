//! Task status state machine.
//!
//! Pure functions over [`TaskStatus`]: the legal-transition table, the
//! actor-aware transition validator, and the predecessor guard. The
//! engine facade composes these with the permission oracle and the
//! dependency graph; nothing here touches storage.

use crate::error::TransitionError;
use crate::types::{TaskId, TaskStatus, TransitionRequest};

/// Legal targets from `from`, including system-only ones.
///
/// Working statuses move freely between each other (boards let a card
/// land in any column); the guards live in the terminal rows, the
/// system-only rule, and the predecessor check.
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> Vec<TaskStatus> {
    use TaskStatus::*;
    match from {
        // Terminal for normal flow; explicit reopen only.
        Done | Cancelled => vec![Todo],
        // Released by the scheduler once predecessors resolve.
        Blocked => vec![Todo],
        Backlog | Todo | InProgress | InReview | Ready | Deferred => ALL_STATUSES
            .into_iter()
            .filter(|&to| to != from)
            .collect(),
    }
}

/// Targets a user may actually pick; system-only statuses filtered out.
#[must_use]
pub fn user_selectable_transitions(from: TaskStatus) -> Vec<TaskStatus> {
    if from.is_system_only() {
        return Vec::new();
    }
    allowed_transitions(from)
        .into_iter()
        .filter(|to| !to.is_system_only())
        .collect()
}

/// Validate a single transition against the table and the actor rules.
///
/// `Blocked` is entered and exited only by the scheduler; a user request
/// touching it is an [`TransitionError::InvalidTransition`] regardless of
/// the table.
pub fn validate_transition(
    from: TaskStatus,
    to: TaskStatus,
    request: TransitionRequest,
) -> Result<(), TransitionError> {
    if (to.is_system_only() || from.is_system_only()) && !request.is_system() {
        return Err(TransitionError::InvalidTransition { from, to });
    }
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

/// Predecessor guard: statuses implying active work are reachable only
/// when every predecessor has resolved (`Done` or `Cancelled`).
pub fn check_dependencies(
    task_id: TaskId,
    to: TaskStatus,
    predecessor_statuses: &[TaskStatus],
) -> Result<(), TransitionError> {
    if !to.implies_active_work() {
        return Ok(());
    }
    let unresolved = predecessor_statuses
        .iter()
        .filter(|s| !s.resolves_dependencies())
        .count();
    if unresolved > 0 {
        return Err(TransitionError::DependencyUnresolved {
            task_id,
            unresolved,
        });
    }
    Ok(())
}

/// All statuses, for exhaustive table checks.
pub const ALL_STATUSES: [TaskStatus; 9] = [
    TaskStatus::Backlog,
    TaskStatus::Todo,
    TaskStatus::InProgress,
    TaskStatus::InReview,
    TaskStatus::Ready,
    TaskStatus::Done,
    TaskStatus::Blocked,
    TaskStatus::Cancelled,
    TaskStatus::Deferred,
];
