//! get_materials - read-only research materials

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::materials;
use crate::tools::Tool;

pub struct GetMaterialsTool;

#[async_trait]
impl Tool for GetMaterialsTool {
    fn name(&self) -> &'static str {
        "get_materials"
    }

    fn description(&self) -> &'static str {
        "Claims, kept fragments, and optionally the evidence graph and citation network for a task"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or_default();
        if task_id.is_empty() {
            return Err(ToolError::invalid_params("task_id is required", "task_id", "non-empty string"));
        }

        let include_graph = args.get("include_graph").and_then(Value::as_bool).unwrap_or(false);
        let include_citations = args.get("include_citations").and_then(Value::as_bool).unwrap_or(false);

        materials::get_materials(&ctx.store, task_id, include_graph, include_citations).await
    }
}
