//! Tool router
//!
//! Maps tool names to handlers, validates input against the schema
//! registry, and guarantees that every outcome - success, domain error, or
//! panic - leaves as a well-formed envelope.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::context::AppContext;
use crate::errors::{ToolError, generate_error_id};
use crate::schema::SchemaRegistry;

use super::Tool;
use super::builtin;

/// Dispatches tool invocations to registered handlers
pub struct ToolRouter {
    tools: HashMap<&'static str, Box<dyn Tool>>,
    schemas: Arc<SchemaRegistry>,
}

impl ToolRouter {
    /// Router with the full tool set registered
    pub fn standard(schemas: Arc<SchemaRegistry>) -> Self {
        let mut router = Self {
            tools: HashMap::new(),
            schemas,
        };

        router.add_tool(Box::new(builtin::CreateTaskTool));
        router.add_tool(Box::new(builtin::QueueTargetsTool));
        router.add_tool(Box::new(builtin::QueueReferenceCandidatesTool));
        router.add_tool(Box::new(builtin::GetStatusTool));
        router.add_tool(Box::new(builtin::StopTaskTool));
        router.add_tool(Box::new(builtin::GetMaterialsTool));
        router.add_tool(Box::new(builtin::CalibrationMetricsTool));
        router.add_tool(Box::new(builtin::CalibrationRollbackTool));
        router.add_tool(Box::new(builtin::GetAuthQueueTool));
        router.add_tool(Box::new(builtin::ResolveAuthTool));
        router.add_tool(Box::new(builtin::NotifyUserTool));
        router.add_tool(Box::new(builtin::WaitForUserTool));
        router.add_tool(Box::new(builtin::FeedbackTool));

        router
    }

    /// Register a tool (last registration wins)
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Whether a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort();
        names
    }

    /// Introspection listing: name, description, and declared schemas
    pub fn describe_tools(&self) -> Vec<Value> {
        self.tool_names()
            .iter()
            .map(|name| {
                let tool = &self.tools[name];
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "input_schema": self.schemas.input_schema(name),
                    "output_schema": self.schemas.output_schema(name),
                })
            })
            .collect()
    }

    /// Dispatch one invocation. Always returns an envelope: `{ok:true, ...}`
    /// on success, an error-taxonomy envelope otherwise.
    pub async fn dispatch(&self, tool_name: &str, args: Value, ctx: &AppContext) -> Value {
        debug!(tool = tool_name, "dispatch: called");

        let Some(tool) = self.tools.get(tool_name) else {
            return ToolError::invalid_params(
                format!("Unknown tool: {}", tool_name),
                "tool",
                &format!("one of: {}", self.tool_names().join(", ")),
            )
            .to_envelope();
        };

        if let Err(e) = self.schemas.validate_input(tool_name, &args) {
            return e.to_envelope();
        }

        // A panicking handler must not tear down the server or leak a raw
        // error shape; it becomes INTERNAL_ERROR with a logged correlation id.
        let outcome = std::panic::AssertUnwindSafe(tool.handle(args, ctx)).catch_unwind().await;

        match outcome {
            Ok(Ok(mut value)) => {
                if !value.is_object() {
                    value = json!({"result": value});
                }
                value["ok"] = json!(true);
                value
            }
            Ok(Err(tool_error)) => {
                if let Some(ref error_id) = tool_error.error_id {
                    error!(tool = tool_name, %error_id, error = %tool_error.message, "Tool failed");
                }
                tool_error.to_envelope()
            }
            Err(panic) => {
                let error_id = generate_error_id();
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = tool_name, %error_id, %detail, "Tool handler panicked");
                ToolError::new(crate::errors::ErrorKind::InternalError, "An unexpected internal error occurred")
                    .with_error_id(error_id)
                    .to_envelope()
            }
        }
    }
}
