//! DredgeStore - SQLite persistence for the dredge research orchestrator
//!
//! Owns the connection, the startup migrations, and every SQL statement the
//! core issues. The rest of the workspace never touches rusqlite directly.
//!
//! # Modules
//!
//! - [`store`] - Connection management and migrations
//! - [`rows`] - Typed row structs and persisted enums
//! - [`jobs`] - Job queue queries (enqueue/fetch/terminal transitions)
//! - [`tasks`] - Task rows and status transitions
//! - [`searches`] - Per-search sub-state rows
//! - [`materials`] - Pages, fragments, claims, edges, corrections
//! - [`calibration`] - Calibration version history and rollback
//! - [`intervention`] - Human-intervention queue
//! - [`rules`] - Domain block/allow rules

pub mod calibration;
pub mod error;
pub mod intervention;
pub mod jobs;
pub mod materials;
pub mod rows;
pub mod rules;
pub mod searches;
pub mod store;
pub mod tasks;

pub use calibration::CalibrationStats;
pub use error::StoreError;
pub use intervention::InterventionFilter;
pub use jobs::{EnqueueOutcome, JobCancelCounts, JobStateCounts, NewJob};
pub use rows::{
    CalibrationRow, ClaimRow, DomainRuleRow, EdgeRow, FragmentRow, InterventionRow, JobRow, JobState, PageRow,
    SearchRow, TaskRow, TaskStatus,
};
pub use store::{Store, now_iso};

/// Job kinds known to the core. The set is open: the dispatcher routes any
/// kind string to whatever action is registered for it.
pub mod job_kinds {
    /// Canonical unified target queue kind.
    pub const TARGET_QUEUE: &str = "target_queue";
    /// Historical kind retained so old rows still load and dispatch.
    pub const SEARCH_QUEUE: &str = "search_queue";
}
