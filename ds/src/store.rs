//! Store open/migration and connection management
//!
//! A single SQLite connection in WAL mode behind an async mutex. Every
//! public query method in this crate acquires the lock, runs synchronous
//! rusqlite code, and releases it before returning; multi-statement
//! invariants run inside IMMEDIATE transactions within one lock hold.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;

/// Migration batches applied in order, tracked via `PRAGMA user_version`.
const MIGRATIONS: &[&[&str]] = &[&[
    "CREATE TABLE tasks (
        id TEXT PRIMARY KEY,
        query TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('created', 'exploring', 'paused', 'completed', 'failed')),
        budget_pages INTEGER NOT NULL,
        max_seconds INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE jobs (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        kind TEXT NOT NULL,
        priority INTEGER NOT NULL,
        slot TEXT NOT NULL,
        state TEXT NOT NULL CHECK(state IN ('queued', 'running', 'completed', 'failed', 'cancelled')),
        input_json TEXT NOT NULL,
        result_json TEXT,
        error_code TEXT,
        queued_at TEXT NOT NULL,
        started_at TEXT,
        finished_at TEXT,
        cancel_requested INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX idx_jobs_fetch ON jobs(slot, state, priority, queued_at)",
    "CREATE INDEX idx_jobs_task ON jobs(task_id, state)",
    "CREATE TABLE searches (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        query TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        pages_fetched INTEGER NOT NULL DEFAULT 0,
        useful_fragments INTEGER NOT NULL DEFAULT 0,
        independent_sources INTEGER NOT NULL DEFAULT 0,
        has_primary_source INTEGER NOT NULL DEFAULT 0,
        satisfaction_score REAL NOT NULL DEFAULT 0,
        harvest_rate REAL NOT NULL DEFAULT 0
    )",
    "CREATE INDEX idx_searches_task ON searches(task_id)",
    "CREATE TABLE pages (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        url TEXT NOT NULL,
        domain TEXT NOT NULL,
        title TEXT,
        citation_count INTEGER,
        year INTEGER,
        fetched_at TEXT NOT NULL
    )",
    "CREATE INDEX idx_pages_task ON pages(task_id)",
    "CREATE TABLE fragments (
        id TEXT PRIMARY KEY,
        page_id TEXT NOT NULL REFERENCES pages(id),
        task_id TEXT NOT NULL REFERENCES tasks(id),
        text TEXT NOT NULL,
        kept INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE INDEX idx_fragments_task ON fragments(task_id, kept)",
    "CREATE TABLE claims (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        text TEXT NOT NULL,
        adoption TEXT NOT NULL DEFAULT 'adopted' CHECK(adoption IN ('adopted', 'not_adopted')),
        confidence REAL
    )",
    "CREATE INDEX idx_claims_task ON claims(task_id)",
    "CREATE TABLE edges (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        src_type TEXT NOT NULL CHECK(src_type IN ('fragment', 'claim', 'page')),
        src_id TEXT NOT NULL,
        dst_type TEXT NOT NULL CHECK(dst_type IN ('fragment', 'claim', 'page')),
        dst_id TEXT NOT NULL,
        relation TEXT NOT NULL CHECK(relation IN ('supports', 'refutes', 'neutral', 'cites', 'evidence_source', 'origin'))
    )",
    "CREATE INDEX idx_edges_task ON edges(task_id, relation)",
    "CREATE TABLE resource_index (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        doi TEXT,
        url TEXT,
        page_id TEXT REFERENCES pages(id)
    )",
    "CREATE INDEX idx_resource_doi ON resource_index(doi)",
    "CREATE INDEX idx_resource_url ON resource_index(url)",
    "CREATE TABLE calibration_versions (
        source TEXT NOT NULL,
        version INTEGER NOT NULL,
        brier_after REAL NOT NULL,
        method TEXT NOT NULL,
        created_at TEXT NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (source, version)
    )",
    "CREATE TABLE intervention_queue (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL REFERENCES tasks(id),
        url TEXT NOT NULL,
        domain TEXT NOT NULL,
        auth_type TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'medium',
        status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'resolved', 'skipped')),
        created_at TEXT NOT NULL,
        resolved_at TEXT,
        success INTEGER
    )",
    "CREATE INDEX idx_intervention_status ON intervention_queue(status, domain)",
    "CREATE TABLE domain_rules (
        domain TEXT PRIMARY KEY,
        rule TEXT NOT NULL CHECK(rule IN ('block', 'allow')),
        reason TEXT NOT NULL DEFAULT 'manual',
        risk TEXT NOT NULL DEFAULT 'low',
        cause_id TEXT,
        note TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE corrections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        edge_id TEXT NOT NULL REFERENCES edges(id),
        previous_relation TEXT NOT NULL,
        corrected_relation TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
]];

/// Current UTC timestamp as an ISO-8601 string, the only timestamp format
/// persisted or exposed at the boundary.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Shared handle to the SQLite store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Migration {
                step: 0,
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate_blocking()?;

        info!(path = %path.display(), "Opened store");
        Ok(store)
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate_blocking()?;
        Ok(store)
    }

    fn migrate_blocking(&self) -> Result<(), StoreError> {
        // At open time nothing else holds the lock.
        let conn = self.conn.try_lock().expect("store lock uncontended during open");

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (idx, batch) in MIGRATIONS.iter().enumerate() {
            let target = (idx + 1) as i64;
            if version >= target {
                continue;
            }

            debug!(step = target, statements = batch.len(), "Applying migration batch");
            for stmt in batch.iter() {
                conn.execute(stmt, []).map_err(|e| StoreError::Migration {
                    step: idx + 1,
                    message: e.to_string(),
                })?;
            }
            conn.pragma_update(None, "user_version", target)?;
        }

        Ok(())
    }

    /// Acquire the connection lock
    pub(crate) async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("dredge.db")).unwrap();

        let conn = store.conn.try_lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('tasks', 'jobs', 'searches', 'pages', 'fragments', 'claims', 'edges', \
                  'resource_index', 'calibration_versions', 'intervention_queue', 'domain_rules', 'corrections')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dredge.db");

        drop(Store::open(&path).unwrap());
        // Re-opening must not re-run migrations
        let store = Store::open(&path).unwrap();

        let conn = store.conn.try_lock().unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("dredge.db");

        let result = Store::open(&path);
        assert!(result.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_now_iso_is_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'), "expected UTC suffix: {}", ts);
    }
}
