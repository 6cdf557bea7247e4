//! notify_user / wait_for_user - notification bridge
//!
//! Delivery is best-effort: a missing or failing sink degrades the response
//! instead of failing the request. The actual human wait is owned by the
//! external intervention transport; `wait_for_user` only announces it.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::tools::Tool;

/// Default advisory timeout communicated to the external transport
const DEFAULT_WAIT_TIMEOUT_SECS: f64 = 300.0;

pub struct NotifyUserTool;

#[async_trait]
impl Tool for NotifyUserTool {
    fn name(&self) -> &'static str {
        "notify_user"
    }

    fn description(&self) -> &'static str {
        "Send a best-effort notification to the user via the configured sink"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let event = args.get("event").and_then(Value::as_str).unwrap_or_default();
        if event.is_empty() {
            return Err(ToolError::invalid_params("event is required", "event", "notification event name"));
        }
        let Some(payload) = args.get("payload") else {
            return Err(ToolError::invalid_params("payload is required", "payload", "object (may be empty)"));
        };

        let notified = ctx.sink.send(event, payload).await;
        debug!(event, notified, "notify_user: dispatched");

        let mut result = json!({"event": event, "notified": notified});
        if !notified {
            result["degraded"] = json!(true);
        }
        Ok(result)
    }
}

pub struct WaitForUserTool;

#[async_trait]
impl Tool for WaitForUserTool {
    fn name(&self) -> &'static str {
        "wait_for_user"
    }

    fn description(&self) -> &'static str {
        "Announce a prompt requiring user input; the wait itself is delegated to the intervention transport"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let prompt = args.get("prompt").and_then(Value::as_str).unwrap_or_default();
        if prompt.is_empty() {
            return Err(ToolError::invalid_params(
                "prompt is required and cannot be empty",
                "prompt",
                "non-empty prompt string",
            ));
        }

        let timeout_seconds = args.get("timeout_seconds").and_then(Value::as_f64).unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
        let options = args.get("options").cloned().unwrap_or_else(|| json!([]));

        ctx.sink
            .send(
                "auth_required",
                &json!({
                    "prompt": prompt,
                    "timeout_seconds": timeout_seconds,
                    "options": options,
                }),
            )
            .await;

        Ok(json!({
            "status": "notification_sent",
            "timeout_seconds": timeout_seconds,
            "prompt": prompt,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_notify_without_sink_degrades_but_succeeds() {
        let ctx = AppContext::in_memory().unwrap();

        for event in ["auth_required", "task_progress", "task_complete", "error", "info"] {
            let result = NotifyUserTool
                .handle(json!({"event": event, "payload": {"message": "hi"}}), &ctx)
                .await
                .unwrap();
            assert_eq!(result["event"], event);
            assert_eq!(result["notified"], false);
            assert_eq!(result["degraded"], true);
        }
    }

    #[tokio::test]
    async fn test_notify_empty_payload_accepted() {
        let ctx = AppContext::in_memory().unwrap();
        let result = NotifyUserTool.handle(json!({"event": "info", "payload": {}}), &ctx).await.unwrap();
        assert_eq!(result["notified"], false);
    }

    #[tokio::test]
    async fn test_notify_missing_payload_rejected() {
        let ctx = AppContext::in_memory().unwrap();
        let err = NotifyUserTool.handle(json!({"event": "info"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert_eq!(err.details.unwrap()["param_name"], "payload");
    }

    #[tokio::test]
    async fn test_wait_for_user_returns_immediately() {
        let ctx = AppContext::in_memory().unwrap();

        let result = WaitForUserTool
            .handle(json!({"prompt": "Please confirm the action", "timeout_seconds": 600}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "notification_sent");
        assert_eq!(result["timeout_seconds"], 600.0);
        assert_eq!(result["prompt"], "Please confirm the action");
    }

    #[tokio::test]
    async fn test_wait_for_user_default_timeout() {
        let ctx = AppContext::in_memory().unwrap();
        let result = WaitForUserTool.handle(json!({"prompt": "confirm"}), &ctx).await.unwrap();
        assert_eq!(result["timeout_seconds"], 300.0);
    }

    #[tokio::test]
    async fn test_wait_for_user_zero_timeout_allowed() {
        let ctx = AppContext::in_memory().unwrap();
        let result = WaitForUserTool
            .handle(json!({"prompt": "confirm", "timeout_seconds": 0}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["timeout_seconds"], 0.0);
    }

    #[tokio::test]
    async fn test_wait_for_user_empty_prompt_rejected() {
        let ctx = AppContext::in_memory().unwrap();
        let err = WaitForUserTool.handle(json!({"prompt": ""}), &ctx).await.unwrap_err();
        assert_eq!(err.details.unwrap()["param_name"], "prompt");
    }
}
