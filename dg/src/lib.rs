//! Dredge - asynchronous research task orchestration core
//!
//! A tool-calling server for LLM-driven web research: an external agent
//! submits work items (search queries, URL fetches, DOI resolutions), the
//! core persists them durably, dispatches them to slot-constrained workers,
//! tracks exploration progress, and serves long-poll status queries.
//!
//! # Core Concepts
//!
//! - **Durable queue**: every work item is a row; dedup, priority, and
//!   cancellation are store transactions, not in-memory bookkeeping
//! - **Wake on commit**: long polls park on per-task notifiers and wake the
//!   moment observable state changes; nothing busy-polls the store
//! - **Uniform envelopes**: every tool outcome is `{ok:true, ...}` or a
//!   taxonomy error with a correlation id for internal failures
//! - **Actions as collaborators**: the search/fetch/extract pipeline hangs
//!   off a registry keyed by job kind; the core owns only orchestration
//!
//! # Modules
//!
//! - [`tools`] - The tool-dispatch boundary (router + thirteen tools)
//! - [`queue`] - Durable priority job queue
//! - [`dispatch`] - Worker pool, action registry, cancellation
//! - [`status`] - Status snapshots and long-polling
//! - [`state`] - Per-task exploration cache
//! - [`server`] - Line-oriented JSON protocol over a Unix socket
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod actions;
pub mod bus;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod feedback;
pub mod intervention;
pub mod materials;
pub mod notify;
pub mod queue;
pub mod schema;
pub mod server;
pub mod state;
pub mod status;
pub mod tools;

// Re-export commonly used types
pub use actions::{ExploreOutcome, ExplorePipeline, ExploreRequest, TargetQueueAction};
pub use bus::ChangeBus;
pub use config::Config;
pub use context::AppContext;
pub use dispatch::{Action, ActionContext, ActionRegistry, CancelRegistry, Dispatcher};
pub use domain::{JobState, Priority, Target, TaskStatus};
pub use errors::{ErrorKind, ToolError, generate_error_id};
pub use notify::NotificationSink;
pub use queue::{CancelScope, JobQueue, QueueReport};
pub use schema::SchemaRegistry;
pub use state::{ExplorationCache, ExplorationSnapshot};
pub use status::{Detail, StatusService};
pub use tools::{Tool, ToolRouter};
