//! Timer sessions, committed time entries, and aggregation.
//!
//! All timer and entry mutations for one user are serialized through a
//! per-user lock; the one-running-timer invariant additionally rests on
//! the store's conditional insert, so even a second process racing this
//! one cannot open two timers.

use crate::clock::Clock;
use crate::error::{EngineError, StoreError, TimeError};
use crate::events::{EngineEvent, EventSink};
use crate::store::TimeEntryStore;
use crate::types::{EntryId, ProjectId, TaskId, TimeEntry, UserId, WorkspaceId};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters for starting a timer or creating a manual entry.
#[derive(Debug, Clone, Default)]
pub struct EntrySpec {
    pub project_id: Option<ProjectId>,
    pub task_id: Option<TaskId>,
    pub description: String,
    pub billable: bool,
    pub tags: Vec<String>,
}

/// Partial edit of an existing entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub billable: Option<bool>,
    pub tags: Option<Vec<String>>,
}

pub struct TimeTracker {
    entries: Arc<dyn TimeEntryStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    user_locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl TimeTracker {
    #[must_use]
    pub fn new(
        entries: Arc<dyn TimeEntryStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            entries,
            clock,
            sink,
            user_locks: RwLock::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.user_locks.read().get(&user_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.user_locks.write();
        Arc::clone(locks.entry(user_id).or_default())
    }

    pub fn start_timer(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        spec: EntrySpec,
    ) -> Result<TimeEntry, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        if self.entries.find_running_entry(user_id)?.is_some() {
            return Err(TimeError::TimerAlreadyRunning(user_id).into());
        }

        let entry = TimeEntry {
            id: EntryId::new(),
            user_id,
            workspace_id,
            project_id: spec.project_id,
            task_id: spec.task_id,
            description: spec.description,
            start_time: self.clock.now(),
            end_time: None,
            duration_secs: 0,
            billable: spec.billable,
            tags: spec.tags,
        };

        match self.entries.insert_running(&entry) {
            Ok(()) => {
                debug!(%user_id, entry_id = %entry.id, "timer started");
                Ok(entry)
            }
            Err(StoreError::RunningEntryExists(user)) => {
                Err(TimeError::TimerAlreadyRunning(user).into())
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn stop_timer(&self, user_id: UserId) -> Result<TimeEntry, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        let mut entry = self
            .entries
            .find_running_entry(user_id)?
            .ok_or(TimeError::NoRunningTimer(user_id))?;

        // Floor at the start instant: a clock that moved backwards
        // closes the entry with zero duration, never a negative one.
        let end = self.clock.now().max(entry.start_time);
        entry.end_time = Some(end);
        entry.duration_secs = (end - entry.start_time).num_seconds().unsigned_abs();
        self.entries.save_entry(&entry)?;

        info!(%user_id, entry_id = %entry.id, secs = entry.duration_secs, "timer stopped");
        self.sink.emit(EngineEvent::TimeEntryClosed {
            workspace_id: entry.workspace_id,
            user_id,
            entry_id: entry.id,
            duration_secs: entry.duration_secs,
        });
        Ok(entry)
    }

    pub fn create_manual_entry(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        spec: EntrySpec,
    ) -> Result<TimeEntry, EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        if end_time <= start_time {
            return Err(TimeError::InvalidRange {
                start: start_time,
                end: end_time,
            }
            .into());
        }

        let entry = TimeEntry {
            id: EntryId::new(),
            user_id,
            workspace_id,
            project_id: spec.project_id,
            task_id: spec.task_id,
            description: spec.description,
            start_time,
            end_time: Some(end_time),
            duration_secs: (end_time - start_time).num_seconds().unsigned_abs(),
            billable: spec.billable,
            tags: spec.tags,
        };

        self.check_overlap(&entry, None)?;
        self.entries.save_entry(&entry)?;
        debug!(%user_id, entry_id = %entry.id, "manual entry created");
        Ok(entry)
    }

    pub fn update_entry(&self, id: EntryId, patch: EntryPatch) -> Result<TimeEntry, EngineError> {
        let current = self.entries.load_entry(id)?;
        let lock = self.user_lock(current.user_id);
        let _guard = lock.lock();

        // Reload under the lock; a concurrent edit may have landed.
        let mut entry = self.entries.load_entry(id)?;
        if let Some(start) = patch.start_time {
            entry.start_time = start;
        }
        if let Some(end) = patch.end_time {
            entry.end_time = Some(end);
        }
        if let Some(description) = patch.description {
            entry.description = description;
        }
        if let Some(billable) = patch.billable {
            entry.billable = billable;
        }
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }

        if let Some(end) = entry.end_time {
            if end <= entry.start_time {
                return Err(TimeError::InvalidRange {
                    start: entry.start_time,
                    end,
                }
                .into());
            }
            entry.duration_secs = (end - entry.start_time).num_seconds().unsigned_abs();
            self.check_overlap(&entry, Some(id))?;
        }

        self.entries.save_entry(&entry)?;
        debug!(entry_id = %id, "entry updated");
        Ok(entry)
    }

    pub fn delete_entry(&self, id: EntryId) -> Result<(), EngineError> {
        let entry = self.entries.load_entry(id)?;
        let lock = self.user_lock(entry.user_id);
        let _guard = lock.lock();
        self.entries.delete_entry(id)?;
        debug!(entry_id = %id, "entry deleted");
        Ok(())
    }

    pub fn entries_for_user(
        &self,
        user_id: UserId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<TimeEntry>, EngineError> {
        Ok(self.entries.load_entries_for_user(user_id, range)?)
    }

    /// Reject `candidate` if its interval intersects any other closed
    /// entry of the same user. `exclude` skips the entry being edited.
    fn check_overlap(
        &self,
        candidate: &TimeEntry,
        exclude: Option<EntryId>,
    ) -> Result<(), EngineError> {
        let existing = self
            .entries
            .load_entries_for_user(candidate.user_id, None)?;
        for other in &existing {
            if Some(other.id) == exclude || other.id == candidate.id {
                continue;
            }
            if candidate.overlaps(other) {
                return Err(TimeError::OverlappingEntry { conflict: other.id }.into());
            }
        }
        Ok(())
    }
}

/// Aggregation axis for [`summarize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// Calendar day (in the workspace time zone) of the entry's start.
    Day,
    /// Project, with a bucket for entries logged against none.
    Project,
    /// The entry's owner.
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey {
    Day(NaiveDate),
    Project(Option<ProjectId>),
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub total_secs: u64,
    pub billable_secs: u64,
    pub non_billable_secs: u64,
}

impl Totals {
    fn add(&mut self, entry: &TimeEntry) {
        self.total_secs += entry.duration_secs;
        if entry.billable {
            self.billable_secs += entry.duration_secs;
        } else {
            self.non_billable_secs += entry.duration_secs;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    pub groups: BTreeMap<GroupKey, Totals>,
    pub overall: Totals,
}

/// Pure reduction over an entry set: per-group and overall totals.
///
/// Running entries contribute nothing until closed. The result does not
/// depend on entry order, and `billable + non_billable == total` holds
/// for every group.
#[must_use]
pub fn summarize(entries: &[TimeEntry], group_by: GroupBy, tz: FixedOffset) -> Summary {
    let mut summary = Summary::default();
    for entry in entries {
        if entry.is_running() {
            continue;
        }
        let key = match group_by {
            GroupBy::Day => GroupKey::Day(entry.start_time.with_timezone(&tz).date_naive()),
            GroupBy::Project => GroupKey::Project(entry.project_id),
            GroupBy::User => GroupKey::User(entry.user_id),
        };
        summary.groups.entry(key).or_default().add(entry);
        summary.overall.add(entry);
    }
    summary
}
