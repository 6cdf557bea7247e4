//! Task rows and status transitions

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::rows::{TaskRow, TaskStatus};
use crate::store::{Store, now_iso};

impl Store {
    /// Insert a new task in `created` state
    pub async fn insert_task(
        &self,
        id: &str,
        query: &str,
        budget_pages: i64,
        max_seconds: i64,
    ) -> Result<(), StoreError> {
        debug!(task_id = %id, "insert_task: called");
        let conn = self.conn().await;
        let now = now_iso();
        conn.execute(
            "INSERT INTO tasks (id, query, status, budget_pages, max_seconds, created_at, updated_at) \
             VALUES (?1, ?2, 'created', ?3, ?4, ?5, ?5)",
            params![id, query, budget_pages, max_seconds, now],
        )?;
        Ok(())
    }

    /// Fetch a task by id
    pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TaskRow::COLUMNS),
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Fetch a task, erroring when it does not exist
    pub async fn get_task_required(&self, id: &str) -> Result<TaskRow, StoreError> {
        self.get_task(id).await?.ok_or_else(|| StoreError::not_found("task", id))
    }

    /// Unconditionally set a task's status
    pub async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        debug!(task_id = %id, %status, "set_task_status: called");
        let conn = self.conn().await;
        let updated = conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.to_string(), now_iso()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("task", id));
        }
        Ok(())
    }

    /// Move a non-terminal task to a terminal status, returning the status it
    /// ended up in. Terminal tasks keep their existing status (idempotent
    /// stop).
    pub async fn finish_task(&self, id: &str, status: TaskStatus) -> Result<TaskStatus, StoreError> {
        debug!(task_id = %id, %status, "finish_task: called");
        let conn = self.conn().await;
        conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 \
             WHERE id = ?1 AND status NOT IN ('completed', 'failed')",
            params![id, status.to_string(), now_iso()],
        )?;
        let current: Option<String> = conn
            .query_row("SELECT status FROM tasks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        current
            .ok_or_else(|| StoreError::not_found("task", id))?
            .parse()
            .map_err(StoreError::Corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get_task() {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "caffeine effects", 120, 1200).await.unwrap();

        let task = store.get_task("task_001").await.unwrap().unwrap();
        assert_eq!(task.query, "caffeine effects");
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.budget_pages, 120);
        assert_eq!(task.max_seconds, 1200);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[tokio::test]
    async fn test_get_task_missing() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_task("nope").await.unwrap().is_none());
        assert!(matches!(
            store.get_task_required("nope").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_finish_task_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.insert_task("task_001", "q", 120, 1200).await.unwrap();

        let status = store.finish_task("task_001", TaskStatus::Completed).await.unwrap();
        assert_eq!(status, TaskStatus::Completed);

        // A second stop does not change the terminal status
        let status = store.finish_task("task_001", TaskStatus::Failed).await.unwrap();
        assert_eq!(status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_set_task_status_unknown_task() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.set_task_status("ghost", TaskStatus::Exploring).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
