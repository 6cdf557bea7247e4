//! create_task - start a new research task

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::context::AppContext;
use crate::domain::public_id;
use crate::errors::ToolError;
use crate::tools::Tool;

pub struct CreateTaskTool;

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn description(&self) -> &'static str {
        "Create a research task with a hypothesis/query and an optional budget override"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
        if query.is_empty() {
            return Err(ToolError::invalid_params(
                "query is required and cannot be empty",
                "query",
                "non-empty query string",
            ));
        }

        let budget = args.get("config").and_then(|c| c.get("budget")).cloned().unwrap_or_else(|| json!({}));

        // The pre-redesign page budget key is rejected outright rather than
        // silently remapped, so stale clients fail loudly.
        if budget.get("max_pages").is_some() {
            return Err(ToolError::invalid_params(
                "budget.max_pages is no longer supported; use budget.budget_pages instead",
                "config.budget.max_pages",
                "budget.budget_pages",
            ));
        }

        let budget_pages = optional_int(&budget, "budget_pages")?.unwrap_or(ctx.config.budget.default_pages);
        let max_seconds = optional_int(&budget, "max_seconds")?.unwrap_or(ctx.config.budget.default_max_seconds);

        let task_id = public_id("task");
        ctx.store.insert_task(&task_id, query, budget_pages, max_seconds).await?;
        ctx.exploration.record_activity(&task_id).await?;
        ctx.bus.signal(&task_id);

        info!(%task_id, budget_pages, max_seconds, "Task created");

        Ok(json!({
            "task_id": task_id,
            "status": "created",
            "budget": {
                "budget_pages": budget_pages,
                "max_seconds": max_seconds,
            },
        }))
    }
}

/// Read an optional integer budget field; zero and negative values are
/// accepted here and validated where the budget is consumed.
fn optional_int(budget: &Value, key: &str) -> Result<Option<i64>, ToolError> {
    match budget.get(key) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            ToolError::invalid_params_received(
                format!("budget.{} must be an integer", key),
                &format!("config.budget.{}", key),
                "integer",
                value,
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use dredgestore::TaskStatus;

    async fn call(ctx: &AppContext, args: Value) -> Result<Value, ToolError> {
        CreateTaskTool.handle(args, ctx).await
    }

    #[tokio::test]
    async fn test_create_with_explicit_budget() {
        let ctx = AppContext::in_memory().unwrap();

        let result = call(
            &ctx,
            json!({"query": "caffeine effects", "config": {"budget": {"budget_pages": 10, "max_seconds": 60}}}),
        )
        .await
        .unwrap();

        assert!(result["task_id"].as_str().unwrap().starts_with("task_"));
        assert_eq!(result["status"], "created");
        assert_eq!(result["budget"]["budget_pages"], 10);
        assert_eq!(result["budget"]["max_seconds"], 60);
    }

    #[tokio::test]
    async fn test_default_budget() {
        let ctx = AppContext::in_memory().unwrap();

        let result = call(&ctx, json!({"query": "caffeine effects"})).await.unwrap();
        assert_eq!(result["budget"]["budget_pages"], 120);
        assert_eq!(result["budget"]["max_seconds"], 1200);

        let task = ctx.store.get_task(result["task_id"].as_str().unwrap()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.query, "caffeine effects");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let ctx = AppContext::in_memory().unwrap();
        let err = call(&ctx, json!({"query": ""})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
    }

    #[tokio::test]
    async fn test_legacy_max_pages_rejected() {
        let ctx = AppContext::in_memory().unwrap();

        let err = call(&ctx, json!({"query": "x", "config": {"budget": {"max_pages": 10}}})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert!(err.message.contains("max_pages is no longer supported"));
        assert!(err.message.contains("budget.budget_pages"));
    }

    #[tokio::test]
    async fn test_zero_and_negative_budgets_accepted() {
        let ctx = AppContext::in_memory().unwrap();

        for (pages, seconds) in [(0, 0), (-1, -1)] {
            let result = call(
                &ctx,
                json!({"query": "x", "config": {"budget": {"budget_pages": pages, "max_seconds": seconds}}}),
            )
            .await
            .unwrap();
            assert_eq!(result["budget"]["budget_pages"], pages);
            assert_eq!(result["budget"]["max_seconds"], seconds);
        }
    }

    #[tokio::test]
    async fn test_non_integer_budget_rejected() {
        let ctx = AppContext::in_memory().unwrap();
        let err = call(&ctx, json!({"query": "x", "config": {"budget": {"budget_pages": "ten"}}}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert_eq!(err.details.unwrap()["param_name"], "config.budget.budget_pages");
    }
}
