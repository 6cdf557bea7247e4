//! get_auth_queue / resolve_auth - human-intervention queue tools

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::intervention::{self, GroupBy, ResolveTarget};
use crate::tools::Tool;

pub struct GetAuthQueueTool;

#[async_trait]
impl Tool for GetAuthQueueTool {
    fn name(&self) -> &'static str {
        "get_auth_queue"
    }

    fn description(&self) -> &'static str {
        "Pending authentication interventions, optionally filtered and grouped by domain or auth type"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str);
        let priority_filter = args.get("priority_filter").and_then(Value::as_str);
        let group_by: GroupBy = args
            .get("group_by")
            .and_then(Value::as_str)
            .unwrap_or("none")
            .parse()
            .map_err(|e: String| ToolError::invalid_params(e, "group_by", "'none', 'domain', or 'type'"))?;

        intervention::list(&ctx.store, task_id, priority_filter, group_by).await
    }
}

pub struct ResolveAuthTool;

#[async_trait]
impl Tool for ResolveAuthTool {
    fn name(&self) -> &'static str {
        "resolve_auth"
    }

    fn description(&self) -> &'static str {
        "Mark intervention items completed or skipped, one item or a whole domain at a time"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let target = ResolveTarget::from_args(&args)?;
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();
        let success = args.get("success").and_then(Value::as_bool);

        intervention::resolve(&ctx.store, &ctx.bus, target, action, success).await
    }
}
