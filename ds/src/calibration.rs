//! Calibration version history
//!
//! Versions are append-only per source. Exactly one row per source carries
//! `is_current`; rollback swaps the flag inside one transaction and never
//! touches historical rows.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::rows::CalibrationRow;
use crate::store::{Store, now_iso};

/// Current calibration summary for one source
#[derive(Debug, Clone)]
pub struct CalibrationStats {
    pub source: String,
    pub current_version: i64,
    pub method: String,
    pub brier_after: f64,
    pub version_count: i64,
}

impl Store {
    /// Append a new version for a source and make it current
    pub async fn append_calibration(
        &self,
        source: &str,
        brier_after: f64,
        method: &str,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        let next: i64 = tx.query_row(
            "SELECT coalesce(max(version), 0) + 1 FROM calibration_versions WHERE source = ?1",
            params![source],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE calibration_versions SET is_current = 0 WHERE source = ?1",
            params![source],
        )?;
        tx.execute(
            "INSERT INTO calibration_versions (source, version, brier_after, method, created_at, is_current) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![source, next, brier_after, method, now_iso()],
        )?;

        tx.commit()?;
        debug!(%source, version = next, "append_calibration: new current version");
        Ok(next)
    }

    /// The current version for a source, if any calibration exists
    pub async fn current_calibration(&self, source: &str) -> Result<Option<CalibrationRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM calibration_versions WHERE source = ?1 AND is_current = 1",
                    CalibrationRow::COLUMNS
                ),
                params![source],
                CalibrationRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Full version history for a source, oldest first
    pub async fn calibration_history(&self, source: &str) -> Result<Vec<CalibrationRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM calibration_versions WHERE source = ?1 ORDER BY version",
            CalibrationRow::COLUMNS
        ))?;
        let rows = stmt.query_map(params![source], CalibrationRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Current-version summaries for every calibrated source
    pub async fn calibration_stats(&self) -> Result<Vec<CalibrationStats>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT c.source, c.version, c.method, c.brier_after, \
                    (SELECT count(*) FROM calibration_versions h WHERE h.source = c.source) \
             FROM calibration_versions c WHERE c.is_current = 1 ORDER BY c.source",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CalibrationStats {
                source: row.get(0)?,
                current_version: row.get(1)?,
                method: row.get(2)?,
                brier_after: row.get(3)?,
                version_count: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Atomically move the current pointer for a source to `version`.
    ///
    /// Returns the target row. The target must exist in history; callers
    /// decide which version is legal to roll back to.
    pub async fn rollback_calibration(&self, source: &str, version: i64) -> Result<CalibrationRow, StoreError> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;

        let target = tx
            .query_row(
                &format!(
                    "SELECT {} FROM calibration_versions WHERE source = ?1 AND version = ?2",
                    CalibrationRow::COLUMNS
                ),
                params![source, version],
                CalibrationRow::from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("calibration version", format!("{}@{}", source, version)))?;

        tx.execute(
            "UPDATE calibration_versions SET is_current = 0 WHERE source = ?1",
            params![source],
        )?;
        tx.execute(
            "UPDATE calibration_versions SET is_current = 1 WHERE source = ?1 AND version = ?2",
            params![source, version],
        )?;

        tx.commit()?;
        info!(%source, version, "rollback_calibration: current pointer moved");
        Ok(CalibrationRow { is_current: true, ..target })
    }
}
