//! Application context
//!
//! Explicit bundle of every shared component, constructed once at startup
//! and threaded through handlers. There are no process-wide singletons.

use std::sync::Arc;
use std::time::Duration;

use dredgestore::Store;

use crate::bus::ChangeBus;
use crate::config::Config;
use crate::dispatch::CancelRegistry;
use crate::notify::NotificationSink;
use crate::queue::JobQueue;
use crate::schema::SchemaRegistry;
use crate::state::ExplorationCache;
use crate::status::StatusService;

/// Shared handles for every tool handler and the dispatcher
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub store: Store,
    pub bus: ChangeBus,
    pub queue: JobQueue,
    pub exploration: ExplorationCache,
    pub status: StatusService,
    pub cancels: CancelRegistry,
    pub schemas: Arc<SchemaRegistry>,
    pub sink: NotificationSink,
}

impl AppContext {
    /// Wire up the context from configuration and an opened store
    pub fn new(config: Config, store: Store) -> eyre::Result<Self> {
        let bus = ChangeBus::new();
        let exploration = ExplorationCache::new(store.clone(), Duration::from_secs(config.status.eviction_secs));
        let queue = JobQueue::new(store.clone(), bus.clone());
        let status = StatusService::new(store.clone(), bus.clone(), exploration.clone(), config.status.clone());
        let schemas = Arc::new(SchemaRegistry::load()?);
        let sink = NotificationSink::new(&config.notify);

        Ok(Self {
            config,
            store,
            bus,
            queue,
            exploration,
            status,
            cancels: CancelRegistry::new(),
            schemas,
            sink,
        })
    }

    /// Context over an in-memory store (ephemeral runs and tests)
    pub fn in_memory() -> eyre::Result<Self> {
        let store = Store::open_in_memory()?;
        Self::new(Config::default(), store)
    }
}
