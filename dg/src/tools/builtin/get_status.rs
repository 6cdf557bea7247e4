//! get_status - long-poll status query

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::status::Detail;
use crate::tools::Tool;

pub struct GetStatusTool;

#[async_trait]
impl Tool for GetStatusTool {
    fn name(&self) -> &'static str {
        "get_status"
    }

    fn description(&self) -> &'static str {
        "Task status snapshot; wait > 0 blocks until observable state changes or the wait elapses (max 60s)"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or_default();
        let wait = args.get("wait").and_then(Value::as_f64).unwrap_or(0.0);
        let detail: Detail = args
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("summary")
            .parse()
            .map_err(|e: String| ToolError::invalid_params(e, "detail", "'summary' or 'full'"))?;

        ctx.status.get_status(task_id, wait, detail).await
    }
}
