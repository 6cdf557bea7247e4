//! Built-in actions
//!
//! The exploration pipeline itself (SERP scraping, fetching, extraction) is
//! an external collaborator behind [`ExplorePipeline`]. The action here owns
//! what the core is responsible for: translating a claimed job into a
//! pipeline request, honoring cancellation, and folding the structured
//! outcome back into the store and the exploration cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dredgestore::SearchRow;

use crate::dispatch::{Action, ActionContext};
use crate::errors::{ErrorKind, ToolError};

/// One unit of exploration work handed to the pipeline collaborator
pub struct ExploreRequest {
    pub task_id: String,
    /// Tagged target descriptor (`kind` = query / url / doi)
    pub target: Value,
    /// Options forwarded from `queue_targets`
    pub options: Value,
    /// Checked by the pipeline between network operations
    pub cancellation: CancellationToken,
}

/// Structured result of one exploration unit
#[derive(Debug, Clone, Default)]
pub struct ExploreOutcome {
    /// Counter deltas folded into the exploration cache
    pub pages_fetched: i64,
    pub fragments_kept: i64,
    pub claims_extracted: i64,
    /// Updated sub-state for the search this job advanced, if any
    pub search: Option<SearchRow>,
    /// Opaque result persisted on the job row
    pub result: Value,
}

/// External exploration collaborator
///
/// Implementations perform their own store writes for pages, fragments,
/// claims, and edges; the outcome carries only the aggregate effects the
/// core tracks itself.
#[async_trait]
pub trait ExplorePipeline: Send + Sync {
    async fn explore(&self, request: ExploreRequest) -> Result<ExploreOutcome, ToolError>;
}

/// Action for `target_queue` (and historical `search_queue`) jobs
pub struct TargetQueueAction {
    kind: &'static str,
    pipeline: Arc<dyn ExplorePipeline>,
}

impl TargetQueueAction {
    pub fn new(pipeline: Arc<dyn ExplorePipeline>) -> Self {
        Self {
            kind: dredgestore::job_kinds::TARGET_QUEUE,
            pipeline,
        }
    }

    /// Same action bound to the historical kind so pre-migration rows still
    /// dispatch.
    pub fn legacy(pipeline: Arc<dyn ExplorePipeline>) -> Self {
        Self {
            kind: dredgestore::job_kinds::SEARCH_QUEUE,
            pipeline,
        }
    }
}

#[async_trait]
impl Action for TargetQueueAction {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn execute(&self, ctx: ActionContext) -> Result<Value, ToolError> {
        if ctx.target.get("kind").and_then(Value::as_str).is_none() {
            return Err(ToolError::pipeline("Job input carries no target descriptor", Some("dispatch")));
        }

        let request = ExploreRequest {
            task_id: ctx.task_id.clone(),
            target: ctx.target.clone(),
            options: ctx.options.clone(),
            cancellation: ctx.cancellation.clone(),
        };

        let outcome = self.pipeline.explore(request).await?;

        // Cancellation after the pipeline returned: stop before folding in
        // results, the dispatcher commits the cancelled transition.
        if ctx.cancellation.is_cancelled() {
            return Err(ToolError::new(ErrorKind::PipelineError, "Cancelled before results were recorded"));
        }

        if let Some(search) = outcome.search {
            ctx.store.upsert_search(&search).await?;
            ctx.exploration.update_search(&ctx.task_id, search).await?;
        }
        ctx.exploration
            .record_progress(
                &ctx.task_id,
                outcome.pages_fetched,
                outcome.fragments_kept,
                outcome.claims_extracted,
            )
            .await?;

        debug!(
            task_id = %ctx.task_id,
            pages = outcome.pages_fetched,
            fragments = outcome.fragments_kept,
            claims = outcome.claims_extracted,
            "TargetQueueAction: outcome recorded"
        );

        Ok(json!({
            "pages_fetched": outcome.pages_fetched,
            "fragments_kept": outcome.fragments_kept,
            "claims_extracted": outcome.claims_extracted,
            "detail": outcome.result,
        }))
    }
}
