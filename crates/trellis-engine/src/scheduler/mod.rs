//! Forward-pass scheduler.
//!
//! Keeps `start_date`/`due_date` and the derived `Blocked` status
//! consistent with the dependency graph and the work calendar. The pass
//! runs entirely against an in-memory snapshot of the affected tasks;
//! the engine facade persists the batch afterwards, so a failure
//! anywhere persists nothing.

use crate::calendar::WorkCalendar;
use crate::error::GraphError;
use crate::graph::DependencyGraph;
use crate::state_machine::validate_transition;
use crate::types::{LinkType, Task, TaskId, TaskStatus, TransitionRequest};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// A status change performed by the pass (always system-derived).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlip {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Result of one forward pass over an affected subgraph.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Tasks whose dates or status changed, in visit order.
    pub changed: Vec<TaskId>,
    /// `Blocked ⇄ Todo` and re-block flips, in visit order.
    pub flips: Vec<StatusFlip>,
}

pub struct Scheduler<'a> {
    calendar: &'a dyn WorkCalendar,
}

impl<'a> Scheduler<'a> {
    #[must_use]
    pub fn new(calendar: &'a dyn WorkCalendar) -> Self {
        Self { calendar }
    }

    /// Recompute the subgraph affected by a mutation of `origin`.
    ///
    /// `tasks` must hold every affected task plus the direct
    /// predecessors of each (predecessors outside the affected set are
    /// read, never written). The map is mutated in place; the caller
    /// persists exactly the ids named in [`PassOutcome::changed`].
    ///
    /// A cycle surfacing here means the insertion-time guard was
    /// bypassed out-of-band; it is returned as an error, never repaired.
    pub fn forward_pass(
        &self,
        graph: &DependencyGraph,
        origin: TaskId,
        tasks: &mut HashMap<TaskId, Task>,
    ) -> Result<PassOutcome, GraphError> {
        let mut affected = graph.transitive_successors(origin);
        affected.insert(origin);

        // Defensive revalidation before touching any dates.
        let order = graph.topo_order()?;
        let mut visit: Vec<TaskId> = order.into_iter().filter(|id| affected.contains(id)).collect();
        if !visit.contains(&origin) {
            // Origin has no links yet; it still gets a visit.
            visit.insert(0, origin);
        }

        let mut outcome = PassOutcome::default();
        for task_id in visit {
            self.visit_task(graph, task_id, tasks, &mut outcome);
        }

        info!(
            affected = affected.len(),
            changed = outcome.changed.len(),
            flips = outcome.flips.len(),
            "forward pass complete"
        );
        Ok(outcome)
    }

    fn visit_task(
        &self,
        graph: &DependencyGraph,
        task_id: TaskId,
        tasks: &mut HashMap<TaskId, Task>,
        outcome: &mut PassOutcome,
    ) {
        let preds = graph.predecessors(task_id);

        let mut unresolved = 0usize;
        let mut constraint: Option<DateTime<Utc>> = None;
        for (pred_id, link_type) in &preds {
            let Some(pred) = tasks.get(pred_id) else {
                continue;
            };
            if !pred.status.resolves_dependencies() {
                unresolved += 1;
            }
            let bound = match link_type {
                LinkType::FinishToStart => pred
                    .due_date
                    .map(|due| self.calendar.next_working_instant(due)),
                LinkType::StartToStart => pred.start_date,
            };
            if let Some(bound) = bound {
                constraint = Some(constraint.map_or(bound, |c| c.max(bound)));
            }
        }

        let Some(task) = tasks.get_mut(&task_id) else {
            return;
        };

        // Work already underway loses its footing when a predecessor
        // reopens; flag it rather than touching its dates.
        if matches!(task.status, TaskStatus::InProgress | TaskStatus::InReview) && unresolved > 0 {
            Self::flip(task, TaskStatus::Blocked, outcome);
            return;
        }

        if task.status.is_terminal() {
            return;
        }

        let pinned = task.pinned_start.then_some(task.start_date).flatten();
        if constraint.is_none() && pinned.is_none() {
            // Nothing to derive dates from; only a possible release.
            if task.status == TaskStatus::Blocked && unresolved == 0 {
                Self::flip(task, TaskStatus::Todo, outcome);
            }
            return;
        }

        let floor = self
            .calendar
            .next_working_instant(pinned.unwrap_or(DateTime::UNIX_EPOCH));
        let earliest_start = constraint.map_or(floor, |c| c.max(floor));

        if let Some(pinned_start) = pinned {
            if earliest_start > pinned_start {
                // Flag, don't silently move a user-pinned date.
                debug!(%task_id, %earliest_start, %pinned_start, "pinned start infeasible");
                if task.status != TaskStatus::Blocked {
                    Self::flip(task, TaskStatus::Blocked, outcome);
                }
                return;
            }
        }

        let new_due = match task.duration_estimate_min {
            Some(minutes) => Some(self.calendar.add_working_duration(earliest_start, minutes)),
            // No estimate: keep the existing due date, lifted to the new
            // start if the move would invert the range.
            None => task.due_date.map(|due| due.max(earliest_start)),
        };

        let dates_changed =
            task.start_date != Some(earliest_start) || task.due_date != new_due;
        if dates_changed {
            debug!(%task_id, %earliest_start, "schedule updated");
            task.start_date = Some(earliest_start);
            task.due_date = new_due;
            if !outcome.changed.contains(&task_id) {
                outcome.changed.push(task_id);
            }
        }

        if task.status == TaskStatus::Blocked && unresolved == 0 {
            Self::flip(task, TaskStatus::Todo, outcome);
        }
    }

    fn flip(task: &mut Task, to: TaskStatus, outcome: &mut PassOutcome) {
        let from = task.status;
        debug_assert!(
            validate_transition(from, to, TransitionRequest::SystemDerived).is_ok(),
            "scheduler flip {from:?} -> {to:?} must be table-legal"
        );
        info!(task_id = %task.id, ?from, ?to, "scheduler status flip");
        task.status = to;
        outcome.flips.push(StatusFlip {
            task_id: task.id,
            from,
            to,
        });
        if !outcome.changed.contains(&task.id) {
            outcome.changed.push(task.id);
        }
    }
}
