//! Calibration metrics and rollback
//!
//! The calibration math itself lives in external collaborators; the core
//! owns the version history and the current-version pointer.

use serde_json::{Value, json};
use tracing::info;

use dredgestore::{Store, StoreError};

use crate::errors::ToolError;

/// Valid `calibration_metrics` actions
pub const METRIC_ACTIONS: [&str; 2] = ["get_stats", "get_evaluations"];

/// Handle `calibration_metrics`
pub async fn metrics(store: &Store, action: &str, source: Option<&str>) -> Result<Value, ToolError> {
    match action {
        "get_stats" => {
            let stats = store.calibration_stats().await?;
            let sources: Vec<Value> = stats
                .iter()
                .map(|s| {
                    json!({
                        "source": &s.source,
                        "current_version": s.current_version,
                        "method": &s.method,
                        "brier_after": s.brier_after,
                        "version_count": s.version_count,
                    })
                })
                .collect();
            Ok(json!({"action": "get_stats", "sources": sources}))
        }
        "get_evaluations" => {
            let source = source.ok_or_else(|| {
                ToolError::invalid_params("source is required for get_evaluations", "source", "non-empty source name")
            })?;
            let history = store.calibration_history(source).await?;
            let evaluations: Vec<Value> = history
                .iter()
                .map(|v| {
                    json!({
                        "version": v.version,
                        "brier_after": v.brier_after,
                        "method": &v.method,
                        "created_at": &v.created_at,
                        "is_current": v.is_current,
                    })
                })
                .collect();
            Ok(json!({"action": "get_evaluations", "source": source, "evaluations": evaluations}))
        }
        other => Err(ToolError::invalid_params(
            format!("Unknown action: {}. Valid actions: {}", other, METRIC_ACTIONS.join(", ")),
            "action",
            &format!("one of: {}", METRIC_ACTIONS.join(", ")),
        )),
    }
}

/// Handle `calibration_rollback`: move the current pointer to an older
/// version, defaulting to the immediately previous one.
pub async fn rollback(
    store: &Store,
    source: &str,
    version: Option<i64>,
    reason: Option<&str>,
) -> Result<Value, ToolError> {
    let current = store.current_calibration(source).await?.ok_or_else(|| {
        ToolError::calibration(
            format!("No calibration found for source: {}", source),
            Some(source),
            Some("not_found"),
        )
    })?;

    let target_version = match version {
        Some(v) => v,
        None => {
            if current.version <= 1 {
                return Err(ToolError::calibration(
                    format!("Cannot rollback '{}': no previous version exists", source),
                    Some(source),
                    Some("no_previous_version"),
                ));
            }
            current.version - 1
        }
    };

    let target = store.rollback_calibration(source, target_version).await.map_err(|err| match err {
        StoreError::NotFound { .. } => ToolError::calibration(
            format!("Version {} not found for source: {}", target_version, source),
            Some(source),
            Some("version_not_found"),
        ),
        other => other.into(),
    })?;

    info!(%source, from = current.version, to = target.version, "Calibration rolled back");

    Ok(json!({
        "source": source,
        "rolled_back_to": target.version,
        "previous_version": current.version,
        "brier_after": target.brier_after,
        "method": target.method,
        "reason": reason,
    }))
}
