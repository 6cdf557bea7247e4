//! Dispatcher - slot-partitioned worker pool
//!
//! One worker task per configured slot instance pulls queued jobs, resolves
//! the action registered for the job kind, and writes the terminal state
//! back. Workers never touch the request-handling path; they race the job's
//! cancellation token against the action so `stop_task(immediate)` takes
//! effect at the next suspension point.

pub mod action;
pub mod cancel;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dredgestore::{JobRow, Store};

use crate::bus::ChangeBus;
use crate::config::QueueConfig;
use crate::errors::generate_error_id;
use crate::queue::JobQueue;
use crate::state::ExplorationCache;

pub use action::{Action, ActionContext, ActionRegistry};
pub use cancel::CancelRegistry;

/// Shared dependencies handed to every worker
#[derive(Clone)]
struct WorkerDeps {
    queue: JobQueue,
    store: Store,
    exploration: ExplorationCache,
    registry: Arc<ActionRegistry>,
    cancels: CancelRegistry,
    bus: ChangeBus,
    poll_interval: Duration,
    root: CancellationToken,
}

/// The running worker pool
pub struct Dispatcher {
    root: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn one worker per slot instance from the queue configuration
    pub fn spawn(
        queue: JobQueue,
        store: Store,
        exploration: ExplorationCache,
        registry: Arc<ActionRegistry>,
        cancels: CancelRegistry,
        bus: ChangeBus,
        config: &QueueConfig,
    ) -> Self {
        let root = CancellationToken::new();
        let deps = WorkerDeps {
            queue,
            store,
            exploration,
            registry,
            cancels,
            bus,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            root: root.clone(),
        };

        let mut workers = Vec::new();
        for (slot, count) in &config.slots {
            for instance in 0..*count {
                let deps = deps.clone();
                let slot = slot.clone();
                workers.push(tokio::spawn(async move {
                    worker_loop(deps, slot, instance).await;
                }));
            }
        }

        info!(workers = workers.len(), "Dispatcher started");
        Self { root, workers }
    }

    /// Cancel all workers and wait for them to drain
    pub async fn shutdown(self) {
        info!("Dispatcher shutting down");
        self.root.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("Dispatcher stopped");
    }
}

async fn worker_loop(deps: WorkerDeps, slot: String, instance: usize) {
    debug!(%slot, instance, "Worker started");
    let work = deps.bus.work();

    loop {
        if deps.root.is_cancelled() {
            break;
        }

        match deps.queue.fetch_next(&slot).await {
            Ok(Some(job)) => {
                run_job(&deps, job).await;
            }
            Ok(None) => {
                // Idle: wait for a wake signal with a poll fallback
                tokio::select! {
                    _ = work.notified() => {}
                    _ = tokio::time::sleep(deps.poll_interval) => {}
                    _ = deps.root.cancelled() => break,
                }
            }
            Err(e) => {
                warn!(%slot, error = %e, "fetch_next failed; backing off");
                tokio::select! {
                    _ = tokio::time::sleep(deps.poll_interval) => {}
                    _ = deps.root.cancelled() => break,
                }
            }
        }
    }

    debug!(%slot, instance, "Worker stopped");
}

async fn run_job(deps: &WorkerDeps, job: JobRow) {
    debug!(job_id = %job.id, task_id = %job.task_id, kind = %job.kind, "run_job: claimed");
    let token = deps.cancels.register(&job.id);

    // A cancel sweep may have marked the row between claim and registration
    if deps.store.is_cancel_requested(&job.id).await.unwrap_or(false) {
        token.cancel();
    }

    let outcome = execute(deps, &job, token.clone()).await;
    deps.cancels.remove(&job.id);

    if let Err(e) = outcome {
        error!(job_id = %job.id, error = %e, "Failed to persist job outcome");
    }

    // Activity is recorded for every terminal transition the worker commits
    if let Err(e) = deps.exploration.record_activity(&job.task_id).await {
        warn!(task_id = %job.task_id, error = %e, "Failed to record activity");
    }
}

async fn execute(deps: &WorkerDeps, job: &JobRow, token: CancellationToken) -> Result<(), dredgestore::StoreError> {
    let Some(action) = deps.registry.get(&job.kind) else {
        let error_id = generate_error_id();
        error!(job_id = %job.id, kind = %job.kind, %error_id, "No action registered for job kind");
        return deps.queue.fail(job, "INTERNAL_ERROR").await;
    };

    let input = job.input().unwrap_or_else(|_| json!({}));
    let ctx = ActionContext {
        job_id: job.id.clone(),
        task_id: job.task_id.clone(),
        target: input.get("target").cloned().unwrap_or(Value::Null),
        options: input.get("options").cloned().unwrap_or_else(|| json!({})),
        store: deps.store.clone(),
        exploration: deps.exploration.clone(),
        cancellation: token.clone(),
    };

    // biased: when cancellation and completion race, cancellation wins and
    // the job never reports a terminal state other than cancelled
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            info!(job_id = %job.id, "Job cancelled");
            deps.queue.cancel_running(job).await
        }
        result = action.execute(ctx) => match result {
            Ok(value) => {
                debug!(job_id = %job.id, "Job completed");
                deps.queue.complete(job, Some(&value)).await
            }
            Err(e) => {
                let code = e.kind.code();
                warn!(job_id = %job.id, error_code = code, error = %e.message, "Job failed");
                deps.queue.fail(job, code).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Target};
    use crate::errors::{ErrorKind, ToolError};
    use async_trait::async_trait;
    use dredgestore::JobState;
    use std::sync::Mutex;

    struct RecordingAction {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Action for RecordingAction {
        fn kind(&self) -> &'static str {
            "target_queue"
        }

        async fn execute(&self, ctx: ActionContext) -> Result<Value, ToolError> {
            let query = ctx.target["query"].as_str().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(query.clone());
            Ok(json!({"handled": query}))
        }
    }

    struct FailingAction;

    #[async_trait]
    impl Action for FailingAction {
        fn kind(&self) -> &'static str {
            "target_queue"
        }

        async fn execute(&self, _ctx: ActionContext) -> Result<Value, ToolError> {
            Err(ToolError::pipeline("extraction blew up", Some("extract")))
        }
    }

    struct HangingAction;

    #[async_trait]
    impl Action for HangingAction {
        fn kind(&self) -> &'static str {
            "target_queue"
        }

        async fn execute(&self, ctx: ActionContext) -> Result<Value, ToolError> {
            // Simulates long external I/O with a cooperative checkpoint
            ctx.cancellation.cancelled().await;
            Ok(json!({}))
        }
    }

    struct Harness {
        store: Store,
        queue: JobQueue,
        cancels: CancelRegistry,
        dispatcher: Dispatcher,
    }

    async fn harness(registry: ActionRegistry) -> Harness {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "q", 120, 1200).await.unwrap();
        let bus = ChangeBus::new();
        let queue = JobQueue::new(store.clone(), bus.clone());
        let exploration = ExplorationCache::new(store.clone(), Duration::from_secs(1800));
        let cancels = CancelRegistry::new();
        let config = QueueConfig {
            poll_interval_ms: 20,
            ..Default::default()
        };

        let dispatcher = Dispatcher::spawn(
            queue.clone(),
            store.clone(),
            exploration,
            Arc::new(registry),
            cancels.clone(),
            bus,
            &config,
        );

        Harness {
            store,
            queue,
            cancels,
            dispatcher,
        }
    }

    fn query_target(q: &str) -> Target {
        Target::parse(&json!({"kind": "query", "query": q}), 0).unwrap()
    }

    async fn wait_for_state(store: &Store, job_id: &str, state: JobState) -> JobRow {
        for _ in 0..100 {
            if let Some(job) = store.get_job(job_id).await.unwrap()
                && job.state == state
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {:?}", job_id, state);
    }

    #[tokio::test]
    async fn test_dispatch_completes_job() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(RecordingAction { seen: seen.clone() }));
        let h = harness(registry).await;

        let report = h
            .queue
            .enqueue_targets("task_001", &[query_target("alpha")], &json!({}), Priority::Medium)
            .await
            .unwrap();

        let job = wait_for_state(&h.store, &report.target_ids[0], JobState::Completed).await;
        assert!(job.finished_at.is_some());
        assert_eq!(job.result_json.as_deref(), Some(r#"{"handled":"alpha"}"#));
        assert_eq!(seen.lock().unwrap().as_slice(), ["alpha"]);

        h.dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_priority_order_with_single_worker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(RecordingAction { seen: seen.clone() }));

        // Enqueue before spawning workers so ordering is deterministic
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "q", 120, 1200).await.unwrap();
        let bus = ChangeBus::new();
        let queue = JobQueue::new(store.clone(), bus.clone());
        queue
            .enqueue_targets("task_001", &[query_target("low")], &json!({}), Priority::Low)
            .await
            .unwrap();
        queue
            .enqueue_targets("task_001", &[query_target("first")], &json!({}), Priority::Medium)
            .await
            .unwrap();
        queue
            .enqueue_targets("task_001", &[query_target("second")], &json!({}), Priority::Medium)
            .await
            .unwrap();
        queue
            .enqueue_targets("task_001", &[query_target("high")], &json!({}), Priority::High)
            .await
            .unwrap();

        let exploration = ExplorationCache::new(store.clone(), Duration::from_secs(1800));
        let dispatcher = Dispatcher::spawn(
            queue.clone(),
            store.clone(),
            exploration,
            Arc::new(registry),
            CancelRegistry::new(),
            bus,
            &QueueConfig {
                poll_interval_ms: 20,
                ..Default::default()
            },
        );

        for _ in 0..100 {
            if seen.lock().unwrap().len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.lock().unwrap().as_slice(), ["high", "first", "second", "low"]);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_failure_records_error_code() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(FailingAction));
        let h = harness(registry).await;

        let report = h
            .queue
            .enqueue_targets("task_001", &[query_target("alpha")], &json!({}), Priority::Medium)
            .await
            .unwrap();

        let job = wait_for_state(&h.store, &report.target_ids[0], JobState::Failed).await;
        assert_eq!(job.error_code.as_deref(), Some("PIPELINE_ERROR"));

        h.dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_with_internal_error() {
        // Empty registry: nothing handles target_queue
        let h = harness(ActionRegistry::new()).await;

        let report = h
            .queue
            .enqueue_targets("task_001", &[query_target("alpha")], &json!({}), Priority::Medium)
            .await
            .unwrap();

        let job = wait_for_state(&h.store, &report.target_ids[0], JobState::Failed).await;
        assert_eq!(job.error_code.as_deref(), Some(ErrorKind::InternalError.code()));

        h.dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_immediate_cancel_transitions_running_job() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(HangingAction));
        let h = harness(registry).await;

        let report = h
            .queue
            .enqueue_targets("task_001", &[query_target("alpha")], &json!({}), Priority::Medium)
            .await
            .unwrap();
        let job_id = report.target_ids[0].clone();

        wait_for_state(&h.store, &job_id, JobState::Running).await;

        // The stop_task(immediate) path: mark rows, then fire tokens
        let counts = h.queue.cancel("task_001", crate::queue::CancelScope::All).await.unwrap();
        assert_eq!(counts.running_marked, vec![job_id.clone()]);
        h.cancels.cancel_many(&counts.running_marked);

        let job = wait_for_state(&h.store, &job_id, JobState::Cancelled).await;
        assert!(job.finished_at.is_some());

        h.dispatcher.shutdown().await;
    }
}
