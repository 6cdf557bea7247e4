//! stop_task - graceful or immediate task stop

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use dredgestore::TaskStatus;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::queue::CancelScope;
use crate::tools::Tool;

/// Stop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StopMode {
    #[default]
    Graceful,
    Immediate,
}

impl std::str::FromStr for StopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graceful" => Ok(Self::Graceful),
            "immediate" => Ok(Self::Immediate),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

impl std::fmt::Display for StopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

pub struct StopTaskTool;

#[async_trait]
impl Tool for StopTaskTool {
    fn name(&self) -> &'static str {
        "stop_task"
    }

    fn description(&self) -> &'static str {
        "Stop a task: graceful cancels queued jobs only, immediate also cancels running jobs"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or_default();
        if task_id.is_empty() {
            return Err(ToolError::invalid_params("task_id is required", "task_id", "non-empty string"));
        }

        let mode: StopMode = args
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("graceful")
            .parse()
            .map_err(|e: String| ToolError::invalid_params(e, "mode", "'graceful' or 'immediate'"))?;
        let reason = args.get("reason").and_then(Value::as_str);

        ctx.store.get_task_required(task_id).await?;

        let scope = match mode {
            StopMode::Graceful => CancelScope::QueuedOnly,
            StopMode::Immediate => CancelScope::All,
        };
        let counts = ctx.queue.cancel(task_id, scope).await?;

        if mode == StopMode::Immediate && !counts.running_marked.is_empty() {
            ctx.cancels.cancel_many(&counts.running_marked);
            self.await_running_drained(ctx, task_id).await?;
        }

        // A task that already failed stays failed; everything else completes
        let final_status = ctx.store.finish_task(task_id, TaskStatus::Completed).await?;
        ctx.exploration.record_activity(task_id).await?;
        ctx.bus.signal(task_id);

        let exploration = ctx.exploration.snapshot(task_id).await?;
        let total_searches = exploration.searches.len();
        let satisfied = exploration.searches.iter().filter(|s| s.status == "satisfied").count();
        let primary = exploration.searches.iter().filter(|s| s.has_primary_source).count();
        let primary_source_ratio = if total_searches > 0 {
            primary as f64 / total_searches as f64
        } else {
            0.0
        };

        info!(%task_id, %mode, ?reason, cancelled = counts.cancelled_queued, "Task stopped");

        Ok(json!({
            "task_id": task_id,
            "status": final_status,
            "mode": mode.to_string(),
            "cancelled_jobs": counts.cancelled_queued + counts.running_marked.len(),
            "summary": {
                "total_searches": total_searches,
                "satisfied_searches": satisfied,
                "total_claims": exploration.total_claims,
                "primary_source_ratio": primary_source_ratio,
                "mode": mode.to_string(),
            },
        }))
    }
}

impl StopTaskTool {
    /// Block until every running job has observed cancellation and committed
    /// its terminal transition, bounded by the configured wait.
    async fn await_running_drained(&self, ctx: &AppContext, task_id: &str) -> Result<(), ToolError> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(ctx.config.queue.immediate_stop_wait_ms);
        let notify = ctx.bus.for_task(task_id);

        loop {
            // Register interest before reading counts so a transition that
            // commits in between still wakes the select below.
            let mut notified = Box::pin(notify.notified());
            notified.as_mut().enable();

            let counts = ctx.store.job_state_counts(task_id).await?;
            if counts.running == 0 {
                return Ok(());
            }

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(%task_id, running = counts.running, "Immediate stop wait expired with jobs still running");
                    return Ok(());
                }
            }
        }
    }
}
