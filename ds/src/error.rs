//! Store error type

use thiserror::Error;

/// Errors surfaced by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at step {step}: {message}")]
    Migration { step: usize, message: String },

    #[error("Illegal {entity} state transition: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("JSON column could not be decoded: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Convenience constructor for not-found rows
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StoreError::not_found("task", "task_abc");
        assert_eq!(err.to_string(), "task not found: task_abc");
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = StoreError::IllegalTransition {
            entity: "job",
            from: "completed".to_string(),
            to: "running".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("running"));
    }
}
