//! Engine facade.
//!
//! [`WorkflowEngine`] owns the collaborators and composes the state
//! machine, dependency graph, scheduler, and time tracker behind one
//! operation surface. Mutations that touch a workspace's graph run
//! under that workspace's exclusive section; timer mutations are
//! serialized per user inside the tracker.

use crate::calendar::WorkCalendar;
use crate::clock::Clock;
use crate::error::{EngineError, GraphError, TransitionError};
use crate::events::{EngineEvent, EventSink};
use crate::graph::DependencyGraph;
use crate::scheduler::{PassOutcome, Scheduler};
use crate::state_machine::{check_dependencies, user_selectable_transitions, validate_transition};
use crate::store::{TaskStore, TimeEntryStore};
use crate::timetrack::{summarize, EntryPatch, EntrySpec, GroupBy, Summary, TimeTracker};
use crate::types::{
    DependencyLink, EntryId, Task, TaskId, TaskStatus, TimeEntry, TransitionRequest, UserId,
    WorkspaceId,
};
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Answers "may this actor set this status on this task". Evaluated
/// only for user-requested transitions; consumed, never implemented,
/// here.
pub trait PermissionOracle: Send + Sync {
    fn may_set_status(&self, actor: UserId, task: &Task, to: TaskStatus) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Workspace time zone offset; per-day aggregation buckets entries
    /// by the calendar day of their start in this offset.
    pub timezone: FixedOffset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: FixedOffset::east_opt(0).expect("zero offset is valid"),
        }
    }
}

/// Everything the engine consumes but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskStore>,
    pub entries: Arc<dyn TimeEntryStore>,
    pub calendar: Arc<dyn WorkCalendar>,
    pub clock: Arc<dyn Clock>,
    pub permissions: Arc<dyn PermissionOracle>,
    pub sink: Arc<dyn EventSink>,
}

/// New scheduling fields for a task; replaces all four at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleUpdate {
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub duration_estimate_min: Option<u32>,
    pub pinned_start: bool,
}

pub struct WorkflowEngine {
    config: EngineConfig,
    tasks: Arc<dyn TaskStore>,
    calendar: Arc<dyn WorkCalendar>,
    permissions: Arc<dyn PermissionOracle>,
    sink: Arc<dyn EventSink>,
    tracker: TimeTracker,
    workspaces: RwLock<HashMap<WorkspaceId, (Arc<DependencyGraph>, Arc<Mutex<()>>)>>,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_config(EngineConfig::default(), collaborators)
    }

    #[must_use]
    pub fn with_config(config: EngineConfig, collaborators: Collaborators) -> Self {
        let tracker = TimeTracker::new(
            Arc::clone(&collaborators.entries),
            Arc::clone(&collaborators.clock),
            Arc::clone(&collaborators.sink),
        );
        Self {
            config,
            tasks: collaborators.tasks,
            calendar: collaborators.calendar,
            permissions: collaborators.permissions,
            sink: collaborators.sink,
            tracker,
            workspaces: RwLock::new(HashMap::new()),
        }
    }

    /// Get or hydrate the workspace's graph and its exclusive section.
    fn workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<(Arc<DependencyGraph>, Arc<Mutex<()>>), EngineError> {
        if let Some((graph, lock)) = self.workspaces.read().get(&workspace_id) {
            return Ok((Arc::clone(graph), Arc::clone(lock)));
        }

        let links = self.tasks.load_links_for_workspace(workspace_id)?;
        let graph = DependencyGraph::hydrate(links).map_err(|err| match err {
            GraphError::CycleDetected => {
                warn!(%workspace_id, "persisted link set is cyclic");
                EngineError::GraphCorrupted(workspace_id)
            }
            other => EngineError::Graph(other),
        })?;

        let mut map = self.workspaces.write();
        let entry = map
            .entry(workspace_id)
            .or_insert_with(|| (Arc::new(graph), Arc::new(Mutex::new(()))));
        Ok((Arc::clone(&entry.0), Arc::clone(&entry.1)))
    }

    // ── Task workflow ───────────────────────────────────────────────

    /// Request a status transition for a task.
    ///
    /// Runs the full guard chain: permission oracle (user requests
    /// only), transition table, actor rules, predecessor resolution.
    /// On success the change is persisted, `TaskStatusChanged` is
    /// emitted, and dependency propagation recomputes the successor
    /// subgraph.
    pub fn transition_task(
        &self,
        task_id: TaskId,
        to: TaskStatus,
        request: TransitionRequest,
    ) -> Result<Task, EngineError> {
        let workspace_id = self.tasks.load_task(task_id)?.workspace_id;
        let (graph, lock) = self.workspace(workspace_id)?;
        let _guard = lock.lock();

        let mut task = self.tasks.load_task(task_id)?;
        if let TransitionRequest::UserRequested { actor } = request {
            if !self.permissions.may_set_status(actor, &task, to) {
                return Err(TransitionError::PermissionDenied { actor, to }.into());
            }
        }
        validate_transition(task.status, to, request)?;

        let predecessor_statuses: Vec<TaskStatus> = graph
            .predecessors(task_id)
            .into_iter()
            .map(|(pred_id, _)| Ok(self.tasks.load_task(pred_id)?.status))
            .collect::<Result<_, EngineError>>()?;
        check_dependencies(task_id, to, &predecessor_statuses)?;

        let from = task.status;
        task.status = to;
        task.validate()?;
        self.tasks.save_task(&task)?;

        info!(%task_id, ?from, ?to, "task transitioned");
        self.sink.emit(EngineEvent::TaskStatusChanged {
            workspace_id,
            task_id,
            from,
            to,
            requested_by: request,
        });

        // Status changes are the sole propagation trigger: successors
        // may gain or lose their footing.
        self.recompute_locked(workspace_id, &graph, &[task_id])?;
        self.tasks.load_task(task_id).map_err(EngineError::from)
    }

    /// Reopen a `Done`/`Cancelled` task back to `Todo`.
    pub fn reopen_task(&self, task_id: TaskId, actor: UserId) -> Result<Task, EngineError> {
        self.transition_task(
            task_id,
            TaskStatus::Todo,
            TransitionRequest::UserRequested { actor },
        )
    }

    /// Statuses a user could pick for this task right now.
    pub fn selectable_statuses(&self, task_id: TaskId) -> Result<Vec<TaskStatus>, EngineError> {
        let task = self.tasks.load_task(task_id)?;
        Ok(user_selectable_transitions(task.status))
    }

    // ── Dependency links ────────────────────────────────────────────

    /// Link two tasks. Rejects self-dependencies and anything that
    /// would create a cycle, atomically, before persistence.
    pub fn add_link(&self, link: DependencyLink) -> Result<(), EngineError> {
        let source = self.tasks.load_task(link.source)?;
        let target = self.tasks.load_task(link.target)?;
        if source.workspace_id != target.workspace_id {
            return Err(GraphError::CrossWorkspaceLink {
                from: link.source,
                target: link.target,
            }
            .into());
        }

        let workspace_id = source.workspace_id;
        let (graph, lock) = self.workspace(workspace_id)?;
        let _guard = lock.lock();

        graph.add_link(link)?;
        if let Err(err) = self.tasks.save_link(&link) {
            // Keep the in-memory graph in step with the store.
            let _ = graph.remove_link(link.source, link.target);
            return Err(err.into());
        }

        info!(source = %link.source, target = %link.target, link_type = ?link.link_type, "link added");
        self.recompute_locked(workspace_id, &graph, &[link.target])
    }

    /// Remove a link; recomputes the former target's successor set
    /// since the critical path may have changed.
    pub fn remove_link(&self, source: TaskId, target: TaskId) -> Result<(), EngineError> {
        let workspace_id = self.tasks.load_task(target)?.workspace_id;
        let (graph, lock) = self.workspace(workspace_id)?;
        let _guard = lock.lock();

        let link_type = graph.remove_link(source, target)?;
        if let Err(err) = self.tasks.delete_link(source, target) {
            let _ = graph.add_link(DependencyLink {
                source,
                target,
                link_type,
            });
            return Err(err.into());
        }

        info!(%source, %target, "link removed");
        self.recompute_locked(workspace_id, &graph, &[target])
    }

    /// Cascade for task deletion by the owning collaborator: drop every
    /// incident link and recompute the tasks that depended on this one.
    pub fn detach_task(&self, task_id: TaskId) -> Result<(), EngineError> {
        let workspace_id = self.tasks.load_task(task_id)?.workspace_id;
        let (graph, lock) = self.workspace(workspace_id)?;
        let _guard = lock.lock();

        for link in self.tasks.load_links_for_task(task_id)? {
            self.tasks.delete_link(link.source, link.target)?;
        }
        let freed = graph.detach_task(task_id);
        if freed.is_empty() {
            return Ok(());
        }
        info!(%task_id, successors = freed.len(), "task detached from graph");
        self.recompute_locked(workspace_id, &graph, &freed)
    }

    // ── Scheduling ──────────────────────────────────────────────────

    /// Replace a task's scheduling fields and recompute its subgraph.
    pub fn set_schedule(
        &self,
        task_id: TaskId,
        update: ScheduleUpdate,
    ) -> Result<Task, EngineError> {
        let workspace_id = self.tasks.load_task(task_id)?.workspace_id;
        let (graph, lock) = self.workspace(workspace_id)?;
        let _guard = lock.lock();

        let mut task = self.tasks.load_task(task_id)?;
        task.start_date = update.start_date;
        task.due_date = update.due_date;
        task.duration_estimate_min = update.duration_estimate_min;
        task.pinned_start = update.pinned_start;
        task.validate()?;
        self.tasks.save_task(&task)?;

        self.recompute_locked(workspace_id, &graph, &[task_id])?;
        self.tasks.load_task(task_id).map_err(EngineError::from)
    }

    /// Recompute one or more origins' affected subgraphs and persist
    /// the batch. Caller must hold the workspace lock.
    fn recompute_locked(
        &self,
        workspace_id: WorkspaceId,
        graph: &DependencyGraph,
        origins: &[TaskId],
    ) -> Result<(), EngineError> {
        // Snapshot: affected tasks plus direct predecessors of each.
        let mut wanted: HashSet<TaskId> = HashSet::new();
        for &origin in origins {
            wanted.insert(origin);
            wanted.extend(graph.transitive_successors(origin));
        }
        for id in wanted.clone() {
            for (pred, _) in graph.predecessors(id) {
                wanted.insert(pred);
            }
        }

        let mut snapshot: HashMap<TaskId, Task> = HashMap::new();
        for id in &wanted {
            snapshot.insert(*id, self.tasks.load_task(*id)?);
        }

        let scheduler = Scheduler::new(self.calendar.as_ref());
        let mut combined = PassOutcome::default();
        for &origin in origins {
            let outcome = scheduler
                .forward_pass(graph, origin, &mut snapshot)
                .map_err(|err| match err {
                    GraphError::CycleDetected => EngineError::GraphCorrupted(workspace_id),
                    other => EngineError::Graph(other),
                })?;
            for id in outcome.changed {
                if !combined.changed.contains(&id) {
                    combined.changed.push(id);
                }
            }
            combined.flips.extend(outcome.flips);
        }

        if combined.changed.is_empty() {
            return Ok(());
        }

        // The batch was computed fully in memory; validate everything
        // before the first write so a failure persists nothing.
        for id in &combined.changed {
            snapshot[id].validate()?;
        }
        for id in &combined.changed {
            self.tasks.save_task(&snapshot[id])?;
        }

        for flip in &combined.flips {
            self.sink.emit(EngineEvent::TaskStatusChanged {
                workspace_id,
                task_id: flip.task_id,
                from: flip.from,
                to: flip.to,
                requested_by: TransitionRequest::SystemDerived,
            });
        }
        self.sink.emit(EngineEvent::ScheduleRecalculated {
            workspace_id,
            task_ids: combined.changed,
        });
        Ok(())
    }

    // ── Graph queries ───────────────────────────────────────────────

    /// Dependency order of every linked task in the workspace.
    pub fn topological_order(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<TaskId>, EngineError> {
        let (graph, _) = self.workspace(workspace_id)?;
        graph.topo_order().map_err(|err| match err {
            GraphError::CycleDetected => EngineError::GraphCorrupted(workspace_id),
            other => EngineError::Graph(other),
        })
    }

    pub fn links(&self, workspace_id: WorkspaceId) -> Result<Vec<DependencyLink>, EngineError> {
        let (graph, _) = self.workspace(workspace_id)?;
        Ok(graph.links())
    }

    // ── Time tracking ───────────────────────────────────────────────

    pub fn start_timer(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        spec: EntrySpec,
    ) -> Result<TimeEntry, EngineError> {
        self.tracker.start_timer(user_id, workspace_id, spec)
    }

    pub fn stop_timer(&self, user_id: UserId) -> Result<TimeEntry, EngineError> {
        self.tracker.stop_timer(user_id)
    }

    pub fn create_manual_entry(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        spec: EntrySpec,
    ) -> Result<TimeEntry, EngineError> {
        self.tracker
            .create_manual_entry(user_id, workspace_id, start_time, end_time, spec)
    }

    pub fn update_entry(&self, id: EntryId, patch: EntryPatch) -> Result<TimeEntry, EngineError> {
        self.tracker.update_entry(id, patch)
    }

    pub fn delete_entry(&self, id: EntryId) -> Result<(), EngineError> {
        self.tracker.delete_entry(id)
    }

    /// Aggregate a user's closed entries in the workspace time zone.
    pub fn summarize_user(
        &self,
        user_id: UserId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        group_by: GroupBy,
    ) -> Result<Summary, EngineError> {
        let entries = self.tracker.entries_for_user(user_id, range)?;
        Ok(summarize(&entries, group_by, self.config.timezone))
    }
}
