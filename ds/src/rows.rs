//! Typed row structs and persisted enums
//!
//! One struct per table, each with a `from_row` mapper kept next to the
//! column list it decodes.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Task lifecycle status
///
/// `Completed` and `Failed` are terminal: no tool may enqueue work into a
/// task in either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Exploring,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Exploring => write!(f, "exploring"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "exploring" => Ok(Self::Exploring),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Job lifecycle state
///
/// Legal transitions: `queued -> running -> {completed | failed | cancelled}`
/// and `queued -> cancelled`. Exactly one terminal transition per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(&self, to: JobState) -> bool {
        matches!(
            (self, to),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(raw: String) -> Result<T, rusqlite::Error> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

/// A row of the `tasks` table
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub query: String,
    pub status: TaskStatus,
    pub budget_pages: i64,
    pub max_seconds: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub(crate) const COLUMNS: &'static str = "id, query, status, budget_pages, max_seconds, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            query: row.get(1)?,
            status: parse_enum(row.get::<_, String>(2)?)?,
            budget_pages: row.get(3)?,
            max_seconds: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

/// A row of the `jobs` table
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub task_id: String,
    pub kind: String,
    pub priority: i64,
    pub slot: String,
    pub state: JobState,
    pub input_json: String,
    pub result_json: Option<String>,
    pub error_code: Option<String>,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub cancel_requested: bool,
}

impl JobRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, kind, priority, slot, state, input_json, result_json, \
         error_code, queued_at, started_at, finished_at, cancel_requested";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            kind: row.get(2)?,
            priority: row.get(3)?,
            slot: row.get(4)?,
            state: parse_enum(row.get::<_, String>(5)?)?,
            input_json: row.get(6)?,
            result_json: row.get(7)?,
            error_code: row.get(8)?,
            queued_at: row.get(9)?,
            started_at: row.get(10)?,
            finished_at: row.get(11)?,
            cancel_requested: row.get::<_, i64>(12)? != 0,
        })
    }

    /// Decode the opaque input payload
    pub fn input(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::from_str(&self.input_json)?)
    }
}

/// A row of the `searches` table (per-search exploration sub-state)
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub id: String,
    pub task_id: String,
    pub query: String,
    pub status: String,
    pub pages_fetched: i64,
    pub useful_fragments: i64,
    pub independent_sources: i64,
    pub has_primary_source: bool,
    pub satisfaction_score: f64,
    pub harvest_rate: f64,
}

impl SearchRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, query, status, pages_fetched, useful_fragments, \
         independent_sources, has_primary_source, satisfaction_score, harvest_rate";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            query: row.get(2)?,
            status: row.get(3)?,
            pages_fetched: row.get(4)?,
            useful_fragments: row.get(5)?,
            independent_sources: row.get(6)?,
            has_primary_source: row.get::<_, i64>(7)? != 0,
            satisfaction_score: row.get(8)?,
            harvest_rate: row.get(9)?,
        })
    }
}

/// A row of the `pages` table
#[derive(Debug, Clone)]
pub struct PageRow {
    pub id: String,
    pub task_id: String,
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub citation_count: Option<i64>,
    pub year: Option<i64>,
    pub fetched_at: String,
}

impl PageRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, url, domain, title, citation_count, year, fetched_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            url: row.get(2)?,
            domain: row.get(3)?,
            title: row.get(4)?,
            citation_count: row.get(5)?,
            year: row.get(6)?,
            fetched_at: row.get(7)?,
        })
    }
}

/// A row of the `fragments` table
#[derive(Debug, Clone)]
pub struct FragmentRow {
    pub id: String,
    pub page_id: String,
    pub task_id: String,
    pub text: String,
    pub kept: bool,
}

impl FragmentRow {
    pub(crate) const COLUMNS: &'static str = "id, page_id, task_id, text, kept";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            page_id: row.get(1)?,
            task_id: row.get(2)?,
            text: row.get(3)?,
            kept: row.get::<_, i64>(4)? != 0,
        })
    }
}

/// A row of the `claims` table
#[derive(Debug, Clone)]
pub struct ClaimRow {
    pub id: String,
    pub task_id: String,
    pub text: String,
    pub adoption: String,
    pub confidence: Option<f64>,
}

impl ClaimRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, text, adoption, confidence";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            text: row.get(2)?,
            adoption: row.get(3)?,
            confidence: row.get(4)?,
        })
    }
}

/// A row of the `edges` table
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub id: String,
    pub task_id: String,
    pub src_type: String,
    pub src_id: String,
    pub dst_type: String,
    pub dst_id: String,
    pub relation: String,
}

impl EdgeRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, src_type, src_id, dst_type, dst_id, relation";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            src_type: row.get(2)?,
            src_id: row.get(3)?,
            dst_type: row.get(4)?,
            dst_id: row.get(5)?,
            relation: row.get(6)?,
        })
    }
}

/// A row of the `calibration_versions` table
#[derive(Debug, Clone)]
pub struct CalibrationRow {
    pub source: String,
    pub version: i64,
    pub brier_after: f64,
    pub method: String,
    pub created_at: String,
    pub is_current: bool,
}

impl CalibrationRow {
    pub(crate) const COLUMNS: &'static str = "source, version, brier_after, method, created_at, is_current";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            source: row.get(0)?,
            version: row.get(1)?,
            brier_after: row.get(2)?,
            method: row.get(3)?,
            created_at: row.get(4)?,
            is_current: row.get::<_, i64>(5)? != 0,
        })
    }
}

/// A row of the `intervention_queue` table
#[derive(Debug, Clone)]
pub struct InterventionRow {
    pub id: String,
    pub task_id: String,
    pub url: String,
    pub domain: String,
    pub auth_type: String,
    pub priority: String,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub success: Option<bool>,
}

impl InterventionRow {
    pub(crate) const COLUMNS: &'static str = "id, task_id, url, domain, auth_type, priority, status, created_at, resolved_at, success";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            url: row.get(2)?,
            domain: row.get(3)?,
            auth_type: row.get(4)?,
            priority: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            resolved_at: row.get(8)?,
            success: row.get::<_, Option<i64>>(9)?.map(|v| v != 0),
        })
    }
}

/// A row of the `domain_rules` table
#[derive(Debug, Clone)]
pub struct DomainRuleRow {
    pub domain: String,
    pub rule: String,
    pub reason: String,
    pub risk: String,
    pub cause_id: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
}

impl DomainRuleRow {
    pub(crate) const COLUMNS: &'static str = "domain, rule, reason, risk, cause_id, note, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            domain: row.get(0)?,
            rule: row.get(1)?,
            reason: row.get(2)?,
            risk: row.get(3)?,
            cause_id: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
