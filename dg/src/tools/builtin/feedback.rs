//! feedback - human corrections across domain / claim / edge scopes

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::feedback::handle_feedback;
use crate::tools::Tool;

pub struct FeedbackTool;

#[async_trait]
impl Tool for FeedbackTool {
    fn name(&self) -> &'static str {
        "feedback"
    }

    fn description(&self) -> &'static str {
        "Apply a user correction: block/unblock domains, reject/restore claims, or relabel an evidence edge"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let action = args.get("action").and_then(Value::as_str).unwrap_or_default();
        if action.is_empty() {
            return Err(ToolError::invalid_params("action is required", "action", "feedback action name"));
        }

        handle_feedback(ctx, action, &args).await
    }
}
