//! Durable job queue
//!
//! Thin orchestration layer over the store's queue transactions: computes
//! ids, priorities, and dedup keys for validated targets, maps store errors
//! into the tool taxonomy, and signals the change bus on every mutation so
//! long-poll status waiters and idle dispatcher workers wake promptly.

use serde_json::{Value, json};
use tracing::{debug, info};

use dredgestore::{JobCancelCounts, JobRow, NewJob, Store, StoreError, job_kinds};

use crate::bus::ChangeBus;
use crate::domain::{Priority, Target, public_id};
use crate::errors::ToolError;

/// Scope of a cancel sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Cancel queued jobs only; running jobs finish naturally
    QueuedOnly,
    /// Also signal running jobs for cooperative cancellation
    All,
}

/// Outcome of `enqueue_targets`, shaped for the tool response
#[derive(Debug, Clone)]
pub struct QueueReport {
    pub queued_count: usize,
    pub skipped_count: usize,
    pub target_ids: Vec<String>,
    pub task_resumed: bool,
    pub message: String,
}

/// Concurrency class for network-bound target jobs
pub const NETWORK_SLOT: &str = "network_client";

/// The durable, priority-ordered, slot-partitioned work queue
#[derive(Clone)]
pub struct JobQueue {
    store: Store,
    bus: ChangeBus,
}

impl JobQueue {
    pub fn new(store: Store, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Enqueue validated targets for a task.
    ///
    /// Deduplicates against live jobs, resumes paused tasks atomically with
    /// the insert, and rejects terminal tasks. `options` rides along in each
    /// job's input payload minus the `priority` key, which is consumed here.
    pub async fn enqueue_targets(
        &self,
        task_id: &str,
        targets: &[Target],
        options: &Value,
        priority: Priority,
    ) -> Result<QueueReport, ToolError> {
        let job_options = strip_priority(options);

        let jobs: Vec<NewJob> = targets
            .iter()
            .map(|target| NewJob {
                id: public_id(target.id_prefix()),
                kind: job_kinds::TARGET_QUEUE.to_string(),
                priority: priority.value(),
                slot: NETWORK_SLOT.to_string(),
                input_json: json!({
                    "target": target.to_input_value(),
                    "options": &job_options,
                })
                .to_string(),
                dedup_path: target.dedup_path().to_string(),
                dedup_value: target.dedup_value(),
            })
            .collect();

        let outcome = self.store.enqueue_jobs(task_id, &jobs).await.map_err(|err| match err {
            StoreError::IllegalTransition { from, .. } => ToolError::invalid_params(
                format!("Cannot queue targets on a {} task", from),
                "task_id",
                "task in created, exploring, or paused state",
            ),
            other => other.into(),
        })?;

        if !outcome.inserted_ids.is_empty() {
            self.bus.signal(task_id);
            self.bus.signal_work();
        }

        let mut message = format!("{} targets queued", outcome.inserted_ids.len());
        if outcome.skipped_count > 0 {
            message.push_str(&format!(" ({} duplicates skipped)", outcome.skipped_count));
        }
        message.push_str(". Use get_status(wait=180) to monitor progress.");

        info!(
            %task_id,
            queued = outcome.inserted_ids.len(),
            skipped = outcome.skipped_count,
            %priority,
            resumed = outcome.task_resumed,
            "Targets queued"
        );

        Ok(QueueReport {
            queued_count: outcome.inserted_ids.len(),
            skipped_count: outcome.skipped_count,
            target_ids: outcome.inserted_ids,
            task_resumed: outcome.task_resumed,
            message,
        })
    }

    /// Claim the next queued job for a slot
    pub async fn fetch_next(&self, slot: &str) -> Result<Option<JobRow>, StoreError> {
        let claimed = self.store.fetch_next_job(slot).await?;
        if let Some(ref job) = claimed {
            self.bus.signal(&job.task_id);
        }
        Ok(claimed)
    }

    /// Record a job's successful completion
    pub async fn complete(&self, job: &JobRow, result: Option<&Value>) -> Result<(), StoreError> {
        let result_json = result.map(Value::to_string);
        self.store.complete_job(&job.id, result_json.as_deref()).await?;
        self.bus.signal(&job.task_id);
        Ok(())
    }

    /// Record a job failure with a taxonomy error code
    pub async fn fail(&self, job: &JobRow, error_code: &str) -> Result<(), StoreError> {
        self.store.fail_job(&job.id, error_code, None).await?;
        self.bus.signal(&job.task_id);
        Ok(())
    }

    /// Record that a running job observed cancellation and stopped
    pub async fn cancel_running(&self, job: &JobRow) -> Result<(), StoreError> {
        self.store.cancel_running_job(&job.id).await?;
        self.bus.signal(&job.task_id);
        Ok(())
    }

    /// Cancel a task's jobs per the scope. Idempotent.
    pub async fn cancel(&self, task_id: &str, scope: CancelScope) -> Result<JobCancelCounts, StoreError> {
        debug!(%task_id, ?scope, "JobQueue::cancel");
        let counts = self.store.cancel_task_jobs(task_id, scope == CancelScope::All).await?;
        if counts.cancelled_queued > 0 || !counts.running_marked.is_empty() {
            self.bus.signal(task_id);
        }
        Ok(counts)
    }
}

fn strip_priority(options: &Value) -> Value {
    match options.as_object() {
        Some(map) => Value::Object(map.iter().filter(|(k, _)| k.as_str() != "priority").map(|(k, v)| (k.clone(), v.clone())).collect()),
        None => json!({}),
    }
}
