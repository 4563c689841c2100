//! In-memory reference implementation of the store traits.
//!
//! Backs the demo binary and the test suite. The conditional
//! running-entry insert holds the write lock across check and insert,
//! which is exactly the atomicity the trait contract demands.

use crate::error::StoreError;
use crate::store::{TaskStore, TimeEntryStore};
use crate::types::{DependencyLink, EntryId, Task, TaskId, TimeEntry, UserId, WorkspaceId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    links: RwLock<Vec<DependencyLink>>,
    entries: RwLock<HashMap<EntryId, TimeEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task directly, outside any engine operation.
    pub fn insert_task(&self, task: Task) {
        self.tasks.write().insert(task.id, task);
    }

    /// Seed an entry directly, outside any engine operation.
    pub fn insert_entry(&self, entry: TimeEntry) {
        self.entries.write().insert(entry.id, entry);
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl TaskStore for MemoryStore {
    fn load_task(&self, id: TaskId) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))
    }

    fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().insert(task.id, task.clone());
        Ok(())
    }

    fn load_links_for_task(&self, id: TaskId) -> Result<Vec<DependencyLink>, StoreError> {
        Ok(self
            .links
            .read()
            .iter()
            .filter(|l| l.source == id || l.target == id)
            .copied()
            .collect())
    }

    fn load_links_for_workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<DependencyLink>, StoreError> {
        let tasks = self.tasks.read();
        Ok(self
            .links
            .read()
            .iter()
            .filter(|l| {
                tasks
                    .get(&l.source)
                    .is_some_and(|t| t.workspace_id == workspace_id)
            })
            .copied()
            .collect())
    }

    fn save_link(&self, link: &DependencyLink) -> Result<(), StoreError> {
        let mut links = self.links.write();
        links.retain(|l| !(l.source == link.source && l.target == link.target));
        links.push(*link);
        Ok(())
    }

    fn delete_link(&self, source: TaskId, target: TaskId) -> Result<(), StoreError> {
        self.links
            .write()
            .retain(|l| !(l.source == source && l.target == target));
        Ok(())
    }
}

impl TimeEntryStore for MemoryStore {
    fn load_entry(&self, id: EntryId) -> Result<TimeEntry, StoreError> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::EntryNotFound(id))
    }

    fn load_entries_for_user(
        &self,
        user_id: UserId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<TimeEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.user_id == user_id)
            .filter(|e| match range {
                Some((from, to)) => e.start_time >= from && e.start_time < to,
                None => true,
            })
            .cloned()
            .collect())
    }

    fn find_running_entry(&self, user_id: UserId) -> Result<Option<TimeEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .values()
            .find(|e| e.user_id == user_id && e.is_running())
            .cloned())
    }

    fn insert_running(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        if entries
            .values()
            .any(|e| e.user_id == entry.user_id && e.is_running())
        {
            return Err(StoreError::RunningEntryExists(entry.user_id));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn save_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        self.entries.write().insert(entry.id, entry.clone());
        Ok(())
    }

    fn delete_entry(&self, id: EntryId) -> Result<(), StoreError> {
        self.entries
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::EntryNotFound(id))
    }
}
