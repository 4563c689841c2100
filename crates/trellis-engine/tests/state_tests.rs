use proptest::prelude::*;
use trellis_engine::error::{EngineError, TransitionError};
use trellis_engine::state_machine::{
    allowed_transitions, check_dependencies, user_selectable_transitions, validate_transition,
    ALL_STATUSES,
};
use trellis_engine::types::{
    DependencyLink, LinkType, TaskId, TaskStatus, TransitionRequest, UserId,
};
use trellis_test_utils::{DenyAll, TestHarness};
use std::sync::Arc;

fn user() -> TransitionRequest {
    TransitionRequest::UserRequested {
        actor: UserId::new(),
    }
}

#[test]
fn working_statuses_move_freely() {
    assert!(validate_transition(TaskStatus::Todo, TaskStatus::InProgress, user()).is_ok());
    assert!(validate_transition(TaskStatus::Todo, TaskStatus::Done, user()).is_ok());
    assert!(validate_transition(TaskStatus::Backlog, TaskStatus::Deferred, user()).is_ok());
    assert!(validate_transition(TaskStatus::InReview, TaskStatus::Todo, user()).is_ok());
}

#[test]
fn terminal_statuses_only_reopen() {
    assert!(validate_transition(TaskStatus::Done, TaskStatus::Todo, user()).is_ok());
    assert!(validate_transition(TaskStatus::Cancelled, TaskStatus::Todo, user()).is_ok());

    assert!(validate_transition(TaskStatus::Done, TaskStatus::InProgress, user()).is_err());
    assert!(validate_transition(TaskStatus::Cancelled, TaskStatus::Done, user()).is_err());
}

#[test]
fn blocked_is_system_only_in_both_directions() {
    // Users cannot enter or leave Blocked.
    assert!(validate_transition(TaskStatus::Todo, TaskStatus::Blocked, user()).is_err());
    assert!(validate_transition(TaskStatus::Blocked, TaskStatus::Todo, user()).is_err());

    // The scheduler can.
    let system = TransitionRequest::SystemDerived;
    assert!(validate_transition(TaskStatus::Todo, TaskStatus::Blocked, system).is_ok());
    assert!(validate_transition(TaskStatus::Blocked, TaskStatus::Todo, system).is_ok());
}

#[test]
fn user_selectable_excludes_blocked() {
    for from in ALL_STATUSES {
        assert!(!user_selectable_transitions(from).contains(&TaskStatus::Blocked));
    }
    assert!(user_selectable_transitions(TaskStatus::Blocked).is_empty());
}

#[test]
fn dependency_guard_counts_unresolved() {
    let task_id = TaskId::new();
    let preds = [TaskStatus::Todo, TaskStatus::Done, TaskStatus::InProgress];

    let err = check_dependencies(task_id, TaskStatus::InProgress, &preds).unwrap_err();
    assert_eq!(
        err,
        TransitionError::DependencyUnresolved {
            task_id,
            unresolved: 2,
        }
    );

    // Non-active targets are never guarded.
    assert!(check_dependencies(task_id, TaskStatus::Deferred, &preds).is_ok());

    // Cancelled predecessors count as resolved.
    let resolved = [TaskStatus::Done, TaskStatus::Cancelled];
    assert!(check_dependencies(task_id, TaskStatus::Done, &resolved).is_ok());
}

proptest! {
    #[test]
    fn prop_system_transitions_match_table(
        from_idx in 0..ALL_STATUSES.len(),
        to_idx in 0..ALL_STATUSES.len()
    ) {
        let from = ALL_STATUSES[from_idx];
        let to = ALL_STATUSES[to_idx];
        let res = validate_transition(from, to, TransitionRequest::SystemDerived);
        prop_assert_eq!(res.is_ok(), allowed_transitions(from).contains(&to));
    }

    #[test]
    fn prop_user_transitions_never_touch_blocked(
        from_idx in 0..ALL_STATUSES.len(),
        to_idx in 0..ALL_STATUSES.len()
    ) {
        let from = ALL_STATUSES[from_idx];
        let to = ALL_STATUSES[to_idx];
        let res = validate_transition(from, to, user());
        let expected = allowed_transitions(from).contains(&to)
            && !from.is_system_only()
            && !to.is_system_only();
        prop_assert_eq!(res.is_ok(), expected);
    }
}

// End-to-end: a successor cannot start until its predecessor resolves.
#[test]
fn transition_blocked_by_unresolved_predecessor() {
    let h = TestHarness::new();
    let a = h.seed_task("a");
    let b = h.seed_task("b");
    h.engine
        .add_link(DependencyLink {
            source: a.id,
            target: b.id,
            link_type: LinkType::FinishToStart,
        })
        .unwrap();

    let err = h
        .engine
        .transition_task(
            b.id,
            TaskStatus::InProgress,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::DependencyUnresolved { .. })
    ));

    h.engine
        .transition_task(
            a.id,
            TaskStatus::Done,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap();

    let b_after = h
        .engine
        .transition_task(
            b.id,
            TaskStatus::InProgress,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap();
    assert_eq!(b_after.status, TaskStatus::InProgress);
}

#[test]
fn permission_oracle_is_consulted_for_user_requests() {
    let h = TestHarness::with_oracle(Arc::new(DenyAll));
    let task = h.seed_task("locked down");

    let err = h
        .engine
        .transition_task(
            task.id,
            TaskStatus::InProgress,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::PermissionDenied { .. })
    ));

    // System transitions skip the oracle entirely.
    let done = h
        .engine
        .transition_task(task.id, TaskStatus::Done, TransitionRequest::SystemDerived)
        .unwrap();
    assert_eq!(done.status, TaskStatus::Done);
}

#[test]
fn status_change_emits_event() {
    let h = TestHarness::new();
    let task = h.seed_task("evented");

    h.engine
        .transition_task(
            task.id,
            TaskStatus::InProgress,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap();

    let events = h.events.snapshot();
    assert_eq!(events.len(), 1);
    match &events[0] {
        trellis_engine::events::EngineEvent::TaskStatusChanged { task_id, from, to, .. } => {
            assert_eq!(*task_id, task.id);
            assert_eq!(*from, TaskStatus::Todo);
            assert_eq!(*to, TaskStatus::InProgress);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
