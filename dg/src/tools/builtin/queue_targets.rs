//! queue_targets - unified query / URL / DOI queueing

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::AppContext;
use crate::domain::{Priority, Target};
use crate::errors::ToolError;
use crate::tools::Tool;

/// Academic metadata APIs an ingest action may consult
const SUPPORTED_ACADEMIC_APIS: [&str; 2] = ["semantic_scholar", "openalex"];

pub struct QueueTargetsTool;

#[async_trait]
impl Tool for QueueTargetsTool {
    fn name(&self) -> &'static str {
        "queue_targets"
    }

    fn description(&self) -> &'static str {
        "Queue search queries, URLs, or DOIs for background exploration; duplicates are skipped and paused tasks resume"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or_default();
        if task_id.is_empty() {
            return Err(ToolError::invalid_params("task_id is required", "task_id", "non-empty string"));
        }

        let raw_targets = args.get("targets").and_then(Value::as_array).cloned().unwrap_or_default();
        if raw_targets.is_empty() {
            return Err(ToolError::invalid_params(
                "targets must not be empty",
                "targets",
                "non-empty array of target objects",
            ));
        }

        // Validate every target before queueing any
        let targets: Vec<Target> = raw_targets
            .iter()
            .enumerate()
            .map(|(index, value)| Target::parse(value, index))
            .collect::<Result<_, _>>()?;

        let options = args.get("options").cloned().unwrap_or_else(|| json!({}));
        validate_engine_list(&options, "serp_engines", None)?;
        validate_engine_list(&options, "academic_apis", Some(&SUPPORTED_ACADEMIC_APIS))?;

        let priority: Priority = options
            .get("priority")
            .and_then(Value::as_str)
            .unwrap_or("medium")
            .parse()
            .map_err(|e: String| ToolError::invalid_params(e, "options.priority", "one of: high, medium, low"))?;

        let report = ctx.queue.enqueue_targets(task_id, &targets, &options, priority).await?;
        ctx.exploration.record_activity(task_id).await?;

        Ok(json!({
            "queued_count": report.queued_count,
            "skipped_count": report.skipped_count,
            "target_ids": report.target_ids,
            "message": report.message,
            "task_resumed": report.task_resumed,
        }))
    }
}

/// Engine/API lists may be omitted entirely, but an empty or unknown entry
/// is a client mistake worth failing fast on.
fn validate_engine_list(options: &Value, key: &str, supported: Option<&[&str]>) -> Result<(), ToolError> {
    let Some(value) = options.get(key) else {
        return Ok(());
    };

    let list = value.as_array().ok_or_else(|| {
        ToolError::invalid_params(
            format!("{} must be an array of strings", key),
            &format!("options.{}", key),
            "array of strings",
        )
    })?;

    if list.is_empty() {
        return Err(ToolError::invalid_params(
            format!("{} cannot be empty; omit the field for auto-selection", key),
            &format!("options.{}", key),
            "non-empty array or omit",
        ));
    }

    if let Some(supported) = supported {
        let unknown: Vec<&str> = list
            .iter()
            .filter_map(Value::as_str)
            .filter(|entry| !supported.contains(entry))
            .collect();
        if !unknown.is_empty() {
            return Err(ToolError::invalid_params(
                format!("Unknown {}: {:?}. Available: {:?}", key, unknown, supported),
                &format!("options.{}", key),
                &format!("one of {:?}", supported),
            ));
        }
    }

    Ok(())
}
