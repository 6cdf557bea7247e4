//! Pages, fragments, claims, edges, the resource index, and the correction
//! log. Action handlers write these; `get_materials` and the feedback
//! handler read and amend them.

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::rows::{ClaimRow, EdgeRow, FragmentRow, PageRow};
use crate::store::{Store, now_iso};

impl Store {
    /// Register a fetched page
    pub async fn insert_page(&self, page: &PageRow) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO pages (id, task_id, url, domain, title, citation_count, year, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                page.id,
                page.task_id,
                page.url,
                page.domain,
                page.title,
                page.citation_count,
                page.year,
                page.fetched_at,
            ],
        )?;
        Ok(())
    }

    /// Register a page in the resource index for DOI/URL deduplication
    pub async fn index_resource(
        &self,
        id: &str,
        task_id: &str,
        doi: Option<&str>,
        url: Option<&str>,
        page_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO resource_index (id, task_id, doi, url, page_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, task_id, doi.map(str::to_lowercase), url, page_id],
        )?;
        Ok(())
    }

    /// Pages fetched for a task
    pub async fn pages_for_task(&self, task_id: &str) -> Result<Vec<PageRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pages WHERE task_id = ?1 ORDER BY fetched_at",
            PageRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![task_id], PageRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Count of pages fetched for a task
    pub async fn page_count(&self, task_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn().await;
        let count = conn.query_row(
            "SELECT count(*) FROM pages WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Insert a fragment
    pub async fn insert_fragment(&self, fragment: &FragmentRow) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO fragments (id, page_id, task_id, text, kept) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fragment.id,
                fragment.page_id,
                fragment.task_id,
                fragment.text,
                fragment.kept as i64,
            ],
        )?;
        Ok(())
    }

    /// Kept fragments for a task
    pub async fn kept_fragments(&self, task_id: &str) -> Result<Vec<FragmentRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fragments WHERE task_id = ?1 AND kept = 1 ORDER BY id",
            FragmentRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![task_id], FragmentRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Count of kept fragments for a task
    pub async fn kept_fragment_count(&self, task_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn().await;
        let count = conn.query_row(
            "SELECT count(*) FROM fragments WHERE task_id = ?1 AND kept = 1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Insert a claim
    pub async fn insert_claim(&self, claim: &ClaimRow) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO claims (id, task_id, text, adoption, confidence) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![claim.id, claim.task_id, claim.text, claim.adoption, claim.confidence],
        )?;
        Ok(())
    }

    /// Claims extracted for a task
    pub async fn claims_for_task(&self, task_id: &str) -> Result<Vec<ClaimRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM claims WHERE task_id = ?1 ORDER BY id",
            ClaimRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![task_id], ClaimRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Count of claims for a task
    pub async fn claim_count(&self, task_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn().await;
        let count = conn.query_row(
            "SELECT count(*) FROM claims WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Set a claim's adoption, idempotently
    pub async fn set_claim_adoption(&self, claim_id: &str, adoption: &str) -> Result<(), StoreError> {
        debug!(%claim_id, %adoption, "set_claim_adoption: called");
        let conn = self.conn().await;
        let updated = conn.execute(
            "UPDATE claims SET adoption = ?2 WHERE id = ?1",
            params![claim_id, adoption],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("claim", claim_id));
        }
        Ok(())
    }

    /// Insert an edge; referential integrity on the endpoint ids is enforced
    /// by the caller having just written the endpoints.
    pub async fn insert_edge(&self, edge: &EdgeRow) -> Result<(), StoreError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO edges (id, task_id, src_type, src_id, dst_type, dst_id, relation) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.id,
                edge.task_id,
                edge.src_type,
                edge.src_id,
                edge.dst_type,
                edge.dst_id,
                edge.relation,
            ],
        )?;
        Ok(())
    }

    /// All edges for a task, optionally filtered by relation
    pub async fn edges_for_task(&self, task_id: &str, relation: Option<&str>) -> Result<Vec<EdgeRow>, StoreError> {
        let conn = self.conn().await;
        let rows = match relation {
            Some(rel) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM edges WHERE task_id = ?1 AND relation = ?2 ORDER BY id",
                    EdgeRow::COLUMNS
                ))?;
                stmt.query_map(params![task_id, rel], EdgeRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM edges WHERE task_id = ?1 ORDER BY id",
                    EdgeRow::COLUMNS
                ))?;
                stmt.query_map(params![task_id], EdgeRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    /// Fetch an edge by id
    pub async fn get_edge(&self, id: &str) -> Result<Option<EdgeRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM edges WHERE id = ?1", EdgeRow::COLUMNS),
                params![id],
                EdgeRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Correct an edge's relation and append a training sample. The sample
    /// is recorded even when the label does not change.
    pub async fn correct_edge(&self, edge_id: &str, relation: &str) -> Result<String, StoreError> {
        debug!(%edge_id, %relation, "correct_edge: called");
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        let previous: Option<String> = tx
            .query_row("SELECT relation FROM edges WHERE id = ?1", params![edge_id], |row| {
                row.get(0)
            })
            .optional()?;
        let previous = previous.ok_or_else(|| StoreError::not_found("edge", edge_id))?;

        tx.execute(
            "UPDATE edges SET relation = ?2 WHERE id = ?1",
            params![edge_id, relation],
        )?;
        tx.execute(
            "INSERT INTO corrections (edge_id, previous_relation, corrected_relation, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![edge_id, previous, relation, now_iso()],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    /// Number of correction samples recorded for an edge
    pub async fn correction_count(&self, edge_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn().await;
        let count = conn.query_row(
            "SELECT count(*) FROM corrections WHERE edge_id = ?1",
            params![edge_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
