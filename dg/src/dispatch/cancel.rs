//! Per-job cancellation token registry
//!
//! The dispatcher registers a token for each running job; `stop_task`
//! (immediate mode) fires tokens by job id. Tokens are removed when the job
//! reaches a terminal state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of cancellation tokens for running jobs
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a job
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner
            .lock()
            .expect("cancel registry lock poisoned")
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Drop a job's token (terminal transition committed)
    pub fn remove(&self, job_id: &str) {
        self.inner.lock().expect("cancel registry lock poisoned").remove(job_id);
    }

    /// Fire the token for a job; returns whether one was registered
    pub fn cancel(&self, job_id: &str) -> bool {
        let token = {
            let inner = self.inner.lock().expect("cancel registry lock poisoned");
            inner.get(job_id).cloned()
        };
        match token {
            Some(token) => {
                debug!(%job_id, "CancelRegistry: firing token");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fire tokens for a batch of jobs
    pub fn cancel_many(&self, job_ids: &[String]) {
        for job_id in job_ids {
            self.cancel(job_id);
        }
    }

    /// Number of registered (running) tokens
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cancel registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
