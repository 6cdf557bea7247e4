//! Change notification bus
//!
//! One `Notify` per task wakes long-poll status waiters the moment an
//! observable mutation commits; a separate work signal wakes idle dispatcher
//! workers when new jobs land. Signalling is fire-and-forget: a signal with
//! no waiters is a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

/// Per-task change signalling plus the dispatcher work signal
#[derive(Clone, Default)]
pub struct ChangeBus {
    tasks: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    work: Arc<Notify>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The notifier for a task, creating it on first reference
    pub fn for_task(&self, task_id: &str) -> Arc<Notify> {
        let mut tasks = self.tasks.lock().expect("bus lock poisoned");
        tasks.entry(task_id.to_string()).or_default().clone()
    }

    /// Signal that a task's observable state changed
    pub fn signal(&self, task_id: &str) {
        debug!(%task_id, "ChangeBus::signal");
        self.for_task(task_id).notify_waiters();
    }

    /// Signal every known task (global observables such as domain rules)
    pub fn signal_all(&self) {
        debug!("ChangeBus::signal_all");
        let tasks = self.tasks.lock().expect("bus lock poisoned");
        for notify in tasks.values() {
            notify.notify_waiters();
        }
    }

    /// Wake dispatcher workers waiting for queued jobs
    pub fn signal_work(&self) {
        self.work.notify_waiters();
    }

    /// The dispatcher work signal
    pub fn work(&self) -> Arc<Notify> {
        self.work.clone()
    }

    /// Drop the notifier for a task (terminal task cleanup)
    pub fn forget(&self, task_id: &str) {
        let mut tasks = self.tasks.lock().expect("bus lock poisoned");
        tasks.remove(task_id);
    }
}
