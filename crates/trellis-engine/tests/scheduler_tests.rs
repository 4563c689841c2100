use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use trellis_engine::engine::ScheduleUpdate;
use trellis_engine::events::EngineEvent;
use trellis_engine::store::TaskStore;
use trellis_engine::types::{
    DependencyLink, LinkType, TaskId, TaskStatus, TransitionRequest,
};
use trellis_test_utils::TestHarness;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    // March 2024; the 4th is a Monday, the 8th a Friday.
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn fs(source: TaskId, target: TaskId) -> DependencyLink {
    DependencyLink {
        source,
        target,
        link_type: LinkType::FinishToStart,
    }
}

fn ss(source: TaskId, target: TaskId) -> DependencyLink {
    DependencyLink {
        source,
        target,
        link_type: LinkType::StartToStart,
    }
}

// Scenario: link A -> B, give A a due date, and the forward pass must
// push B past it.
#[test]
fn finish_to_start_successor_starts_after_predecessor_due() {
    let h = TestHarness::new();
    let a = h.seed_task("a");
    let b = h.seed_estimated_task("b", 60);

    h.engine.add_link(fs(a.id, b.id)).unwrap();
    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                due_date: Some(at(5, 12)),
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();

    let a_after = h.store.load_task(a.id).unwrap();
    let b_after = h.store.load_task(b.id).unwrap();
    assert!(b_after.start_date.unwrap() >= a_after.due_date.unwrap());
    assert_eq!(b_after.start_date, Some(at(5, 12)));
    assert_eq!(b_after.due_date, Some(at(5, 13)));
}

#[test]
fn start_to_start_successor_starts_with_predecessor() {
    let h = TestHarness::new();
    let a = h.seed_estimated_task("a", 8 * 60);
    let b = h.seed_estimated_task("b", 60);

    h.engine.add_link(ss(a.id, b.id)).unwrap();
    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                start_date: Some(at(4, 9)),
                duration_estimate_min: Some(8 * 60),
                pinned_start: true,
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();

    let b_after = h.store.load_task(b.id).unwrap();
    assert_eq!(b_after.start_date, Some(at(4, 9)));
}

#[test]
fn chain_schedules_monotonically() {
    let h = TestHarness::new();
    let tasks: Vec<_> = (0..4)
        .map(|i| h.seed_estimated_task(&format!("t{i}"), 4 * 60))
        .collect();
    for pair in tasks.windows(2) {
        h.engine.add_link(fs(pair[0].id, pair[1].id)).unwrap();
    }

    h.engine
        .set_schedule(
            tasks[0].id,
            ScheduleUpdate {
                start_date: Some(at(4, 9)),
                duration_estimate_min: Some(4 * 60),
                pinned_start: true,
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();

    for pair in tasks.windows(2) {
        let pred = h.store.load_task(pair[0].id).unwrap();
        let succ = h.store.load_task(pair[1].id).unwrap();
        assert!(
            succ.start_date.unwrap() >= pred.due_date.unwrap(),
            "{} must not start before {} is due",
            succ.title,
            pred.title
        );
    }
}

// "Flag, don't silently move": a pinned start that became infeasible
// blocks the task and leaves its dates alone.
#[test]
fn infeasible_pinned_start_blocks_without_moving_dates() {
    let h = TestHarness::new();
    let a = h.seed_task("a");
    let b = h.seed_task("b");

    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                due_date: Some(at(6, 12)),
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();
    h.engine
        .set_schedule(
            b.id,
            ScheduleUpdate {
                start_date: Some(at(4, 9)),
                pinned_start: true,
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();

    h.engine.add_link(fs(a.id, b.id)).unwrap();

    let b_after = h.store.load_task(b.id).unwrap();
    assert_eq!(b_after.status, TaskStatus::Blocked);
    assert_eq!(b_after.start_date, Some(at(4, 9)));

    // Predecessor done but its due date still collides: stays blocked.
    h.engine
        .transition_task(
            a.id,
            TaskStatus::Done,
            TransitionRequest::UserRequested { actor: h.actor },
        )
        .unwrap();
    assert_eq!(
        h.store.load_task(b.id).unwrap().status,
        TaskStatus::Blocked
    );

    // Pull the predecessor's due date clear of the pin: released.
    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                due_date: Some(at(1, 17)),
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();
    let b_released = h.store.load_task(b.id).unwrap();
    assert_eq!(b_released.status, TaskStatus::Todo);
    assert_eq!(b_released.start_date, Some(at(4, 9)));
}

// Reopening a finished predecessor re-blocks successors that had
// already started on the strength of it.
#[test]
fn reopen_reblocks_started_successor() {
    let h = TestHarness::new();
    let a = h.seed_task("a");
    let b = h.seed_task("b");
    h.engine.add_link(fs(a.id, b.id)).unwrap();

    let user = TransitionRequest::UserRequested { actor: h.actor };
    h.engine.transition_task(a.id, TaskStatus::Done, user).unwrap();
    h.engine
        .transition_task(b.id, TaskStatus::InProgress, user)
        .unwrap();

    h.engine.reopen_task(a.id, h.actor).unwrap();

    assert_eq!(h.store.load_task(a.id).unwrap().status, TaskStatus::Todo);
    assert_eq!(
        h.store.load_task(b.id).unwrap().status,
        TaskStatus::Blocked
    );

    // The flip is system-derived and visible through the sink.
    let reblocked = h.events.snapshot().into_iter().any(|e| {
        matches!(
            e,
            EngineEvent::TaskStatusChanged {
                task_id,
                to: TaskStatus::Blocked,
                requested_by: TransitionRequest::SystemDerived,
                ..
            } if task_id == b.id
        )
    });
    assert!(reblocked);
}

// One ScheduleRecalculated per mutation batch, not per task.
#[test]
fn recompute_emits_one_batch_event() {
    let h = TestHarness::new();
    let a = h.seed_estimated_task("a", 60);
    let b = h.seed_estimated_task("b", 60);
    let c = h.seed_estimated_task("c", 60);
    h.engine.add_link(fs(a.id, b.id)).unwrap();
    h.engine.add_link(fs(b.id, c.id)).unwrap();

    let before = h.events.snapshot();
    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                start_date: Some(at(4, 9)),
                duration_estimate_min: Some(60),
                pinned_start: true,
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();

    let new_events: Vec<_> = h.events.snapshot().into_iter().skip(before.len()).collect();
    let batches: Vec<_> = new_events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ScheduleRecalculated { task_ids, .. } => Some(task_ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(batches.len(), 1);
    // The whole chain moved in that single batch.
    assert!(batches[0].contains(&a.id));
    assert!(batches[0].contains(&b.id));
    assert!(batches[0].contains(&c.id));
}

#[test]
fn removing_link_triggers_recompute_but_keeps_relaxed_dates() {
    let h = TestHarness::new();
    let a = h.seed_task("a");
    let b = h.seed_estimated_task("b", 60);
    h.engine.add_link(fs(a.id, b.id)).unwrap();
    h.engine
        .set_schedule(
            a.id,
            ScheduleUpdate {
                due_date: Some(at(5, 12)),
                ..ScheduleUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(h.store.load_task(b.id).unwrap().start_date, Some(at(5, 12)));

    let before = h.events.len();
    h.engine.remove_link(a.id, b.id).unwrap();

    // Constraints only relaxed; dates stay where the pass left them and
    // a no-change recompute emits nothing.
    assert_eq!(h.store.load_task(b.id).unwrap().start_date, Some(at(5, 12)));
    assert_eq!(h.events.len(), before);
}
