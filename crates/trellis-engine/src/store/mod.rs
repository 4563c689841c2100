//! Persistence collaborator traits.
//!
//! The engine never owns storage; it loads and saves through these
//! traits. Every call is atomic at the single-entity level. Multi-entity
//! sequencing (e.g. persisting a whole recompute batch) is the engine's
//! responsibility, not the store's.

use crate::error::StoreError;
use crate::types::{DependencyLink, EntryId, Task, TaskId, TimeEntry, UserId, WorkspaceId};
use chrono::{DateTime, Utc};

pub mod memory;

pub use memory::MemoryStore;

pub trait TaskStore: Send + Sync {
    fn load_task(&self, id: TaskId) -> Result<Task, StoreError>;

    fn save_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Links where `id` is either endpoint.
    fn load_links_for_task(&self, id: TaskId) -> Result<Vec<DependencyLink>, StoreError>;

    /// Full link set of a workspace; used to hydrate the in-memory graph
    /// the first time a workspace is touched.
    fn load_links_for_workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<DependencyLink>, StoreError>;

    fn save_link(&self, link: &DependencyLink) -> Result<(), StoreError>;

    fn delete_link(&self, source: TaskId, target: TaskId) -> Result<(), StoreError>;
}

pub trait TimeEntryStore: Send + Sync {
    fn load_entry(&self, id: EntryId) -> Result<TimeEntry, StoreError>;

    /// Entries whose start time falls inside `range` (half-open), or all
    /// of the user's entries when `range` is `None`.
    fn load_entries_for_user(
        &self,
        user_id: UserId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<TimeEntry>, StoreError>;

    fn find_running_entry(&self, user_id: UserId) -> Result<Option<TimeEntry>, StoreError>;

    /// Conditional insert keyed on "no open entry for this user".
    ///
    /// Must fail with [`StoreError::RunningEntryExists`] atomically when
    /// the user already holds an open entry; a plain check-then-set is
    /// not an acceptable implementation.
    fn insert_running(&self, entry: &TimeEntry) -> Result<(), StoreError>;

    fn save_entry(&self, entry: &TimeEntry) -> Result<(), StoreError>;

    fn delete_entry(&self, id: EntryId) -> Result<(), StoreError>;
}
