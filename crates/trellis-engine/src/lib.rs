//! Trellis workflow engine.
//!
//! The scheduling core of the Trellis project-management application:
//! a task status state machine with guarded transitions, an acyclic
//! dependency graph driving forward-pass auto-scheduling, and a
//! time-tracking engine with non-overlap and aggregation guarantees.
//!
//! The engine is a library consumed in-process by a request-handling
//! layer. Persistence, permissions, the work calendar, and event
//! delivery are collaborators supplied by the caller.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trellis_engine::prelude::*;
//!
//! let engine = WorkflowEngine::new(collaborators);
//!
//! engine.add_link(DependencyLink {
//!     source: design.id,
//!     target: build.id,
//!     link_type: LinkType::FinishToStart,
//! })?;
//!
//! engine.transition_task(
//!     design.id,
//!     TaskStatus::Done,
//!     TransitionRequest::UserRequested { actor },
//! )?;
//! ```

pub mod calendar;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod timetrack;
pub mod types;

pub mod prelude {
    pub use crate::calendar::{WeekdayCalendar, WorkCalendar};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::engine::{
        Collaborators, EngineConfig, PermissionOracle, ScheduleUpdate, WorkflowEngine,
    };
    pub use crate::error::{
        EngineError, GraphError, StoreError, TimeError, TransitionError,
    };
    pub use crate::events::{EngineEvent, EventLog, EventSink, NullSink};
    pub use crate::store::{TaskStore, TimeEntryStore};
    pub use crate::timetrack::{EntryPatch, EntrySpec, GroupBy, Summary, Totals};
    pub use crate::types::{
        DependencyLink, EntryId, LinkType, Priority, Task, TaskId, TaskStatus, TimeEntry,
        TransitionRequest, UserId, WorkspaceId,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
