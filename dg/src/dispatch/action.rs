//! Action trait and registry
//!
//! An action is the handler bound to a job kind. The core treats actions as
//! opaque collaborators: they receive the target, perform their own store
//! writes (pages, fragments, claims, edges), and return a structured result
//! that is persisted on the job row.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use dredgestore::Store;

use crate::errors::ToolError;
use crate::state::ExplorationCache;

/// Everything an action needs to execute one job
pub struct ActionContext {
    pub job_id: String,
    pub task_id: String,
    /// The target descriptor from the job's input payload
    pub target: Value,
    /// Per-job options forwarded from `queue_targets`
    pub options: Value,
    pub store: Store,
    pub exploration: ExplorationCache,
    /// Cooperative cancellation: actions check this between external I/O
    /// operations and stop promptly once it fires
    pub cancellation: CancellationToken,
}

/// A handler bound to a job kind, invoked by the dispatcher
#[async_trait]
pub trait Action: Send + Sync {
    /// Job kind this action handles
    fn kind(&self) -> &'static str;

    /// Execute one job. Returning `Err` fails the job with the error's
    /// taxonomy code; pipeline-band failures preserve whatever store writes
    /// already committed.
    async fn execute(&self, ctx: ActionContext) -> Result<Value, ToolError>;
}

/// Static map from job kind to action
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its kind; the last registration wins
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.kind(), action);
    }

    /// Look up the action for a job kind
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(kind).cloned()
    }

    /// Registered kinds
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.actions.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoAction;

    #[async_trait]
    impl Action for EchoAction {
        fn kind(&self) -> &'static str {
            "target_queue"
        }

        async fn execute(&self, ctx: ActionContext) -> Result<Value, ToolError> {
            Ok(json!({"echo": ctx.target}))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(EchoAction));

        assert!(registry.get("target_queue").is_some());
        assert!(registry.get("unknown_kind").is_none());
        assert_eq!(registry.kinds(), vec!["target_queue"]);
    }
}
