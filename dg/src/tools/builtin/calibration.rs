//! calibration_metrics / calibration_rollback

use async_trait::async_trait;
use serde_json::Value;

use crate::calibration;
use crate::context::AppContext;
use crate::errors::ToolError;
use crate::tools::Tool;

pub struct CalibrationMetricsTool;

#[async_trait]
impl Tool for CalibrationMetricsTool {
    fn name(&self) -> &'static str {
        "calibration_metrics"
    }

    fn description(&self) -> &'static str {
        "Calibration statistics: get_stats for current versions per source, get_evaluations for one source's history"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();
        let source = args.get("source").and_then(Value::as_str);
        calibration::metrics(&ctx.store, action, source).await
    }
}

pub struct CalibrationRollbackTool;

#[async_trait]
impl Tool for CalibrationRollbackTool {
    fn name(&self) -> &'static str {
        "calibration_rollback"
    }

    fn description(&self) -> &'static str {
        "Roll a source's current calibration back to an older version (previous version by default)"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let source = args.get("source").and_then(Value::as_str).unwrap_or_default();
        if source.is_empty() {
            return Err(ToolError::invalid_params("source is required", "source", "non-empty source name"));
        }

        let version = args.get("version").and_then(Value::as_i64);
        let reason = args.get("reason").and_then(Value::as_str);

        calibration::rollback(&ctx.store, source, version, reason).await
    }
}
