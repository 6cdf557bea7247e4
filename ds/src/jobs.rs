//! Job queue queries
//!
//! All queue invariants live here: the dedup check and insert share one
//! IMMEDIATE transaction, fetch-next is a single UPDATE..RETURNING, and
//! terminal transitions refuse to fire twice.

use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::debug;

use crate::error::StoreError;
use crate::rows::{JobRow, JobState, TaskStatus};
use crate::store::{Store, now_iso};

/// A job prepared for insertion by the queue layer
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub kind: String,
    pub priority: i64,
    pub slot: String,
    /// Serialized `{target, options}` payload
    pub input_json: String,
    /// Target field the dedup key is computed from (`query`, `url`, `doi`)
    pub dedup_path: String,
    /// Normalized value of that field (DOI values arrive lowercased)
    pub dedup_value: String,
}

/// Result of an enqueue transaction
#[derive(Debug, Clone, Default)]
pub struct EnqueueOutcome {
    pub inserted_ids: Vec<String>,
    pub skipped_count: usize,
    pub task_resumed: bool,
}

/// Per-state job counts for one task
#[derive(Debug, Clone, Copy, Default)]
pub struct JobStateCounts {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Result of a cancel sweep over one task's jobs
#[derive(Debug, Clone, Default)]
pub struct JobCancelCounts {
    /// Queued jobs flipped straight to `cancelled`
    pub cancelled_queued: usize,
    /// Running jobs marked for cooperative cancellation
    pub running_marked: Vec<String>,
}

impl Store {
    /// Enqueue a batch of jobs for a task, atomically with dedup and
    /// paused-task resumption.
    ///
    /// Duplicates - same `(task_id, kind, normalized target field)` with a
    /// row already in `queued` or `running` - are skipped, including
    /// duplicates appearing earlier in the same batch. When at least one row
    /// is inserted, a `created` or `paused` task flips to `exploring` in the
    /// same commit.
    pub async fn enqueue_jobs(&self, task_id: &str, jobs: &[NewJob]) -> Result<EnqueueOutcome, StoreError> {
        debug!(%task_id, batch = jobs.len(), "enqueue_jobs: called");
        let mut conn = self.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status: TaskStatus = tx
            .query_row("SELECT status FROM tasks WHERE id = ?1", params![task_id], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .ok_or_else(|| StoreError::not_found("task", task_id))?
            .parse()
            .map_err(StoreError::Corrupt)?;

        if status.is_terminal() {
            return Err(StoreError::IllegalTransition {
                entity: "task",
                from: status.to_string(),
                to: TaskStatus::Exploring.to_string(),
            });
        }

        let mut outcome = EnqueueOutcome::default();
        let now = now_iso();

        for job in jobs {
            // DOI dedup is case-insensitive; query and url compare verbatim.
            let dedup_sql = if job.dedup_path == "doi" {
                "SELECT id FROM jobs WHERE task_id = ?1 AND kind = ?2 \
                 AND state IN ('queued', 'running') \
                 AND lower(json_extract(input_json, '$.target.' || ?3)) = ?4"
            } else {
                "SELECT id FROM jobs WHERE task_id = ?1 AND kind = ?2 \
                 AND state IN ('queued', 'running') \
                 AND json_extract(input_json, '$.target.' || ?3) = ?4"
            };

            let existing: Option<String> = tx
                .query_row(
                    dedup_sql,
                    params![task_id, job.kind, job.dedup_path, job.dedup_value],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                debug!(%task_id, dedup = %job.dedup_value, %existing_id, "enqueue_jobs: skipping duplicate");
                outcome.skipped_count += 1;
                continue;
            }

            tx.execute(
                "INSERT INTO jobs (id, task_id, kind, priority, slot, state, input_json, queued_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'queued', ?6, ?7)",
                params![job.id, task_id, job.kind, job.priority, job.slot, job.input_json, now],
            )?;
            outcome.inserted_ids.push(job.id.clone());
        }

        if !outcome.inserted_ids.is_empty() && matches!(status, TaskStatus::Created | TaskStatus::Paused) {
            tx.execute(
                "UPDATE tasks SET status = 'exploring', updated_at = ?2 WHERE id = ?1",
                params![task_id, now],
            )?;
            outcome.task_resumed = status == TaskStatus::Paused;
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Atomically claim the highest-priority queued job for a slot.
    ///
    /// Lower priority value wins; ties break FIFO on `queued_at`. The claimed
    /// row transitions to `running` with `started_at` stamped.
    pub async fn fetch_next_job(&self, slot: &str) -> Result<Option<JobRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "UPDATE jobs SET state = 'running', started_at = ?1 \
             WHERE id = (SELECT id FROM jobs WHERE state = 'queued' AND slot = ?2 \
                         ORDER BY priority ASC, queued_at ASC LIMIT 1) \
             RETURNING {}",
            JobRow::COLUMNS
        ))?;
        let row = stmt.query_row(params![now_iso(), slot], JobRow::from_row).optional()?;
        if let Some(ref job) = row {
            debug!(job_id = %job.id, %slot, priority = job.priority, "fetch_next_job: claimed");
        }
        Ok(row)
    }

    /// Fetch a job by id
    pub async fn get_job(&self, id: &str) -> Result<Option<JobRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JobRow::COLUMNS),
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Transition a running job to `completed`
    pub async fn complete_job(&self, id: &str, result_json: Option<&str>) -> Result<(), StoreError> {
        debug!(job_id = %id, "complete_job: called");
        self.finish_job(id, JobState::Completed, result_json, None).await
    }

    /// Transition a running job to `failed` with a taxonomy error code
    pub async fn fail_job(&self, id: &str, error_code: &str, result_json: Option<&str>) -> Result<(), StoreError> {
        debug!(job_id = %id, %error_code, "fail_job: called");
        self.finish_job(id, JobState::Failed, result_json, Some(error_code)).await
    }

    /// Transition a running job to `cancelled` after the worker observed the
    /// cancellation signal.
    pub async fn cancel_running_job(&self, id: &str) -> Result<(), StoreError> {
        debug!(job_id = %id, "cancel_running_job: called");
        self.finish_job(id, JobState::Cancelled, None, None).await
    }

    async fn finish_job(
        &self,
        id: &str,
        state: JobState,
        result_json: Option<&str>,
        error_code: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn().await;
        let updated = conn.execute(
            "UPDATE jobs SET state = ?2, result_json = ?3, error_code = ?4, finished_at = ?5 \
             WHERE id = ?1 AND state = 'running'",
            params![id, state.to_string(), result_json, error_code, now_iso()],
        )?;

        if updated == 0 {
            let current: Option<String> = conn
                .query_row("SELECT state FROM jobs WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            return match current {
                None => Err(StoreError::not_found("job", id)),
                Some(from) => Err(StoreError::IllegalTransition {
                    entity: "job",
                    from,
                    to: state.to_string(),
                }),
            };
        }
        Ok(())
    }

    /// Cancel a task's jobs.
    ///
    /// Queued jobs transition straight to `cancelled`. When `include_running`
    /// is set, running jobs are marked `cancel_requested` and their ids
    /// returned so the dispatcher can fire the in-memory tokens; the workers
    /// themselves commit the `cancelled` transition. Idempotent.
    pub async fn cancel_task_jobs(&self, task_id: &str, include_running: bool) -> Result<JobCancelCounts, StoreError> {
        debug!(%task_id, include_running, "cancel_task_jobs: called");
        let mut conn = self.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let cancelled_queued = tx.execute(
            "UPDATE jobs SET state = 'cancelled', finished_at = ?2 \
             WHERE task_id = ?1 AND state = 'queued'",
            params![task_id, now_iso()],
        )?;

        let mut running_marked = Vec::new();
        if include_running {
            let mut stmt = tx.prepare(
                "UPDATE jobs SET cancel_requested = 1 \
                 WHERE task_id = ?1 AND state = 'running' RETURNING id",
            )?;
            let ids = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;
            for id in ids {
                running_marked.push(id?);
            }
            drop(stmt);
        }

        tx.commit()?;
        Ok(JobCancelCounts {
            cancelled_queued,
            running_marked,
        })
    }

    /// Whether a cancel has been requested for a job (cooperative checkpoint)
    pub async fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn().await;
        let flag: Option<i64> = conn
            .query_row("SELECT cancel_requested FROM jobs WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Per-state job counts for a task
    pub async fn job_state_counts(&self, task_id: &str) -> Result<JobStateCounts, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare("SELECT state, count(*) FROM jobs WHERE task_id = ?1 GROUP BY state")?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = JobStateCounts::default();
        for row in rows {
            let (state, count) = row?;
            match state.as_str() {
                "queued" => counts.queued = count,
                "running" => counts.running = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                "cancelled" => counts.cancelled = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Live (queued or running) jobs for a task, in dispatch order
    pub async fn live_jobs(&self, task_id: &str) -> Result<Vec<JobRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE task_id = ?1 AND state IN ('queued', 'running') \
             ORDER BY priority ASC, queued_at ASC",
            JobRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![task_id], JobRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_kinds;

    fn query_job(id: &str, query: &str, priority: i64) -> NewJob {
        NewJob {
            id: id.to_string(),
            kind: job_kinds::TARGET_QUEUE.to_string(),
            priority,
            slot: "network_client".to_string(),
            input_json: serde_json::json!({
                "target": {"kind": "query", "query": query, "options": {}},
                "options": {},
            })
            .to_string(),
            dedup_path: "query".to_string(),
            dedup_value: query.to_string(),
        }
    }

    fn doi_job(id: &str, doi: &str) -> NewJob {
        NewJob {
            id: id.to_string(),
            kind: job_kinds::TARGET_QUEUE.to_string(),
            priority: 50,
            slot: "network_client".to_string(),
            input_json: serde_json::json!({
                "target": {"kind": "doi", "doi": doi, "reason": "manual", "context": {}},
                "options": {},
            })
            .to_string(),
            dedup_path: "doi".to_string(),
            dedup_value: doi.to_lowercase(),
        }
    }

    async fn store_with_task() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "test question", 120, 1200).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_enqueue_inserts_and_flips_created_to_exploring() {
        let store = store_with_task().await;

        let outcome = store
            .enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)])
            .await
            .unwrap();
        assert_eq!(outcome.inserted_ids, vec!["tq_1"]);
        assert_eq!(outcome.skipped_count, 0);
        assert!(!outcome.task_resumed);

        let task = store.get_task("task_001").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Exploring);
    }

    #[tokio::test]
    async fn test_enqueue_dedups_across_calls() {
        let store = store_with_task().await;

        store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await.unwrap();
        let second = store
            .enqueue_jobs("task_001", &[query_job("tq_2", "alpha", 50)])
            .await
            .unwrap();

        assert_eq!(second.inserted_ids.len(), 0);
        assert_eq!(second.skipped_count, 1);
    }

    #[tokio::test]
    async fn test_enqueue_dedups_within_one_batch() {
        let store = store_with_task().await;

        let outcome = store
            .enqueue_jobs(
                "task_001",
                &[query_job("tq_1", "alpha", 50), query_job("tq_2", "alpha", 50)],
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted_ids, vec!["tq_1"]);
        assert_eq!(outcome.skipped_count, 1);
    }

    #[tokio::test]
    async fn test_enqueue_doi_dedup_is_case_insensitive() {
        let store = store_with_task().await;

        store
            .enqueue_jobs("task_001", &[doi_job("td_1", "10.1234/Example.Paper")])
            .await
            .unwrap();
        let second = store
            .enqueue_jobs("task_001", &[doi_job("td_2", "10.1234/example.paper")])
            .await
            .unwrap();

        assert_eq!(second.skipped_count, 1);
    }

    #[tokio::test]
    async fn test_enqueue_resumes_paused_task() {
        let store = store_with_task().await;
        store.set_task_status("task_001", TaskStatus::Paused).await.unwrap();

        let outcome = store
            .enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)])
            .await
            .unwrap();
        assert!(outcome.task_resumed);

        let task = store.get_task("task_001").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Exploring);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_terminal_task() {
        let store = store_with_task().await;
        store.set_task_status("task_001", TaskStatus::Failed).await.unwrap();

        let result = store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn test_enqueue_unknown_task() {
        let store = Store::open_in_memory().unwrap();
        let result = store.enqueue_jobs("ghost", &[query_job("tq_1", "alpha", 50)]).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_fetch_next_honors_priority_then_fifo() {
        let store = store_with_task().await;
        store
            .enqueue_jobs(
                "task_001",
                &[
                    query_job("tq_low", "low", 90),
                    query_job("tq_first", "first", 50),
                    query_job("tq_second", "second", 50),
                    query_job("tq_high", "high", 10),
                ],
            )
            .await
            .unwrap();

        let a = store.fetch_next_job("network_client").await.unwrap().unwrap();
        let b = store.fetch_next_job("network_client").await.unwrap().unwrap();
        let c = store.fetch_next_job("network_client").await.unwrap().unwrap();
        let d = store.fetch_next_job("network_client").await.unwrap().unwrap();

        assert_eq!(a.id, "tq_high");
        assert_eq!(b.id, "tq_first");
        assert_eq!(c.id, "tq_second");
        assert_eq!(d.id, "tq_low");
        assert_eq!(a.state, JobState::Running);
        assert!(a.started_at.is_some());

        assert!(store.fetch_next_job("network_client").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_next_respects_slot() {
        let store = store_with_task().await;
        store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await.unwrap();

        assert!(store.fetch_next_job("other_slot").await.unwrap().is_none());
        assert!(store.fetch_next_job("network_client").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_job_stamps_finished_at() {
        let store = store_with_task().await;
        store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await.unwrap();
        let job = store.fetch_next_job("network_client").await.unwrap().unwrap();

        store.complete_job(&job.id, Some("{\"pages\": 3}")).await.unwrap();

        let job = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());
        assert_eq!(job.result_json.as_deref(), Some("{\"pages\": 3}"));
    }

    #[tokio::test]
    async fn test_terminal_transition_fires_once() {
        let store = store_with_task().await;
        store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await.unwrap();
        let job = store.fetch_next_job("network_client").await.unwrap().unwrap();

        store.complete_job(&job.id, None).await.unwrap();
        let second = store.fail_job(&job.id, "PIPELINE_ERROR", None).await;
        assert!(matches!(second, Err(StoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn test_cannot_complete_queued_job() {
        let store = store_with_task().await;
        store.enqueue_jobs("task_001", &[query_job("tq_1", "alpha", 50)]).await.unwrap();

        let result = store.complete_job("tq_1", None).await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn test_cancel_queued_only_preserves_running() {
        let store = store_with_task().await;
        store
            .enqueue_jobs(
                "task_001",
                &[
                    query_job("tq_1", "a", 50),
                    query_job("tq_2", "b", 50),
                    query_job("tq_3", "c", 50),
                ],
            )
            .await
            .unwrap();
        let running = store.fetch_next_job("network_client").await.unwrap().unwrap();

        let counts = store.cancel_task_jobs("task_001", false).await.unwrap();
        assert_eq!(counts.cancelled_queued, 2);
        assert!(counts.running_marked.is_empty());

        let job = store.get_job(&running.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_cancel_all_marks_running() {
        let store = store_with_task().await;
        store
            .enqueue_jobs("task_001", &[query_job("tq_1", "a", 50), query_job("tq_2", "b", 50)])
            .await
            .unwrap();
        let running = store.fetch_next_job("network_client").await.unwrap().unwrap();

        let counts = store.cancel_task_jobs("task_001", true).await.unwrap();
        assert_eq!(counts.cancelled_queued, 1);
        assert_eq!(counts.running_marked, vec![running.id.clone()]);
        assert!(store.is_cancel_requested(&running.id).await.unwrap());

        // Worker observes the signal and commits the transition
        store.cancel_running_job(&running.id).await.unwrap();
        let job = store.get_job(&running.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.finished_at.is_some());

        // Idempotent sweep
        let counts = store.cancel_task_jobs("task_001", true).await.unwrap();
        assert_eq!(counts.cancelled_queued, 0);
        assert!(counts.running_marked.is_empty());
    }

    #[tokio::test]
    async fn test_job_state_counts() {
        let store = store_with_task().await;
        store
            .enqueue_jobs("task_001", &[query_job("tq_1", "a", 50), query_job("tq_2", "b", 50)])
            .await
            .unwrap();
        store.fetch_next_job("network_client").await.unwrap();

        let counts = store.job_state_counts("task_001").await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.completed, 0);
    }

    #[tokio::test]
    async fn test_live_jobs_ordering() {
        let store = store_with_task().await;
        store
            .enqueue_jobs(
                "task_001",
                &[query_job("tq_low", "a", 90), query_job("tq_high", "b", 10)],
            )
            .await
            .unwrap();

        let live = store.live_jobs("task_001").await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].id, "tq_high");
        assert_eq!(live[1].id, "tq_low");
    }
}
