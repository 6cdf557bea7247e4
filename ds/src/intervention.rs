//! Human-intervention queue
//!
//! Action handlers enqueue authentication requests here when a fetch hits a
//! login wall; the agent drains them through `get_auth_queue`/`resolve_auth`.

use rusqlite::params;
use tracing::debug;

use crate::error::StoreError;
use crate::rows::InterventionRow;
use crate::store::{Store, now_iso};

/// Filters for listing intervention items
#[derive(Debug, Clone, Default)]
pub struct InterventionFilter {
    pub task_id: Option<String>,
    pub priority: Option<String>,
}

impl Store {
    /// Enqueue an intervention request
    pub async fn insert_intervention(
        &self,
        id: &str,
        task_id: &str,
        url: &str,
        domain: &str,
        auth_type: &str,
        priority: &str,
    ) -> Result<(), StoreError> {
        debug!(queue_id = %id, %task_id, %domain, "insert_intervention: called");
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO intervention_queue (id, task_id, url, domain, auth_type, priority, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
            params![id, task_id, url, domain, auth_type, priority, now_iso()],
        )?;
        Ok(())
    }

    /// Pending intervention items matching the filter, oldest first
    pub async fn pending_interventions(
        &self,
        filter: &InterventionFilter,
    ) -> Result<Vec<InterventionRow>, StoreError> {
        let conn = self.conn().await;
        let mut sql = format!(
            "SELECT {} FROM intervention_queue WHERE status = 'pending'",
            InterventionRow::COLUMNS
        );
        let mut args: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(ref task_id) = filter.task_id {
            sql.push_str(" AND task_id = ?");
            args.push(task_id);
        }
        if let Some(ref priority) = filter.priority {
            sql.push_str(" AND priority = ?");
            args.push(priority);
        }
        sql.push_str(" ORDER BY created_at");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), InterventionRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Pending and high-priority counts feeding the status envelope
    pub async fn intervention_counts(&self, task_id: Option<&str>) -> Result<(i64, i64), StoreError> {
        let conn = self.conn().await;
        let (pending, high) = match task_id {
            Some(task_id) => conn.query_row(
                "SELECT count(*), coalesce(sum(priority = 'high'), 0) \
                 FROM intervention_queue WHERE status = 'pending' AND task_id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
            None => conn.query_row(
                "SELECT count(*), coalesce(sum(priority = 'high'), 0) \
                 FROM intervention_queue WHERE status = 'pending'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
        };
        Ok((pending, high))
    }

    /// Resolve a single pending item; returns the number of rows updated
    pub async fn resolve_intervention_item(
        &self,
        queue_id: &str,
        status: &str,
        success: Option<bool>,
    ) -> Result<usize, StoreError> {
        debug!(%queue_id, %status, "resolve_intervention_item: called");
        let conn = self.conn().await;
        let updated = conn.execute(
            "UPDATE intervention_queue SET status = ?2, resolved_at = ?3, success = ?4 \
             WHERE id = ?1 AND status = 'pending'",
            params![queue_id, status, now_iso(), success.map(|s| s as i64)],
        )?;
        Ok(updated)
    }

    /// Resolve every pending item for a domain; returns the number updated
    pub async fn resolve_intervention_domain(
        &self,
        domain: &str,
        status: &str,
        success: Option<bool>,
    ) -> Result<usize, StoreError> {
        debug!(%domain, %status, "resolve_intervention_domain: called");
        let conn = self.conn().await;
        let updated = conn.execute(
            "UPDATE intervention_queue SET status = ?2, resolved_at = ?3, success = ?4 \
             WHERE domain = ?1 AND status = 'pending'",
            params![domain, status, now_iso(), success.map(|s| s as i64)],
        )?;
        Ok(updated)
    }
}
