//! Per-search exploration sub-state rows
//!
//! Action handlers upsert these as they work; the status service and the
//! exploration cache read them back.

use rusqlite::{OptionalExtension, params};

use crate::error::StoreError;
use crate::rows::SearchRow;
use crate::store::Store;

impl Store {
    /// Insert or replace a search sub-state row
    pub async fn upsert_search(&self, search: &SearchRow) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO searches (id, task_id, query, status, pages_fetched, useful_fragments, \
                                   independent_sources, has_primary_source, satisfaction_score, harvest_rate) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(id) DO UPDATE SET \
                 status = excluded.status, \
                 pages_fetched = excluded.pages_fetched, \
                 useful_fragments = excluded.useful_fragments, \
                 independent_sources = excluded.independent_sources, \
                 has_primary_source = excluded.has_primary_source, \
                 satisfaction_score = excluded.satisfaction_score, \
                 harvest_rate = excluded.harvest_rate",
            params![
                search.id,
                search.task_id,
                search.query,
                search.status,
                search.pages_fetched,
                search.useful_fragments,
                search.independent_sources,
                search.has_primary_source as i64,
                search.satisfaction_score,
                search.harvest_rate,
            ],
        )?;
        Ok(())
    }

    /// All search sub-states for a task
    pub async fn searches_for_task(&self, task_id: &str) -> Result<Vec<SearchRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM searches WHERE task_id = ?1 ORDER BY id",
            SearchRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![task_id], SearchRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// One search sub-state by id
    pub async fn get_search(&self, id: &str) -> Result<Option<SearchRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM searches WHERE id = ?1", SearchRow::COLUMNS),
                params![id],
                SearchRow::from_row,
            )
            .optional()?;
        Ok(row)
    }
}
