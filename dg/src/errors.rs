//! Tool error taxonomy
//!
//! One structured error type flows from every handler to the router, which
//! converts it into the `{ok:false, ...}` envelope. Handlers never let raw
//! implementation errors cross the tool boundary.

use serde_json::{Value, json};
use thiserror::Error;

use dredgestore::StoreError;

/// Stable error codes exposed to clients.
///
/// Grouped in four bands: validation, resource, pipeline, internal. The
/// string codes are a wire contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParams,
    TaskNotFound,
    BudgetExhausted,
    AuthRequired,
    AllEnginesBlocked,
    ChromeNotReady,
    PipelineError,
    CalibrationError,
    Timeout,
    PipelineTimeout,
    ParserNotAvailable,
    SerpSearchFailed,
    AllFetchesFailed,
    InternalError,
}

impl ErrorKind {
    /// The wire code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams => "INVALID_PARAMS",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::BudgetExhausted => "BUDGET_EXHAUSTED",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AllEnginesBlocked => "ALL_ENGINES_BLOCKED",
            Self::ChromeNotReady => "CHROME_NOT_READY",
            Self::PipelineError => "PIPELINE_ERROR",
            Self::CalibrationError => "CALIBRATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::PipelineTimeout => "PIPELINE_TIMEOUT",
            Self::ParserNotAvailable => "PARSER_NOT_AVAILABLE",
            Self::SerpSearchFailed => "SERP_SEARCH_FAILED",
            Self::AllFetchesFailed => "ALL_FETCHES_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured error carried across the tool boundary
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
    pub error_id: Option<String>,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            error_id: None,
        }
    }

    /// Attach structured details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a correlation id
    pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
        self.error_id = Some(error_id.into());
        self
    }

    /// Validation failure with `{param_name, expected}` details
    pub fn invalid_params(message: impl Into<String>, param_name: &str, expected: &str) -> Self {
        Self::new(ErrorKind::InvalidParams, message).with_details(json!({
            "param_name": param_name,
            "expected": expected,
        }))
    }

    /// Validation failure that also echoes the received value
    pub fn invalid_params_received(
        message: impl Into<String>,
        param_name: &str,
        expected: &str,
        received: &Value,
    ) -> Self {
        Self::new(ErrorKind::InvalidParams, message).with_details(json!({
            "param_name": param_name,
            "expected": expected,
            "received": received.to_string(),
        }))
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(ErrorKind::TaskNotFound, format!("Task not found: {}", task_id))
            .with_details(json!({"task_id": task_id}))
    }

    pub fn calibration(message: impl Into<String>, source: Option<&str>, reason: Option<&str>) -> Self {
        let mut details = serde_json::Map::new();
        if let Some(source) = source {
            details.insert("source".to_string(), json!(source));
        }
        if let Some(reason) = reason {
            details.insert("reason".to_string(), json!(reason));
        }
        let err = Self::new(ErrorKind::CalibrationError, message);
        if details.is_empty() { err } else { err.with_details(Value::Object(details)) }
    }

    pub fn pipeline(message: impl Into<String>, stage: Option<&str>) -> Self {
        let err = Self::new(ErrorKind::PipelineError, message);
        match stage {
            Some(stage) => err.with_details(json!({"stage": stage})),
            None => err,
        }
    }

    /// Unexpected failure: always carries a fresh correlation id
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message).with_error_id(generate_error_id())
    }

    /// Serialize into the uniform failure envelope
    pub fn to_envelope(&self) -> Value {
        let mut envelope = json!({
            "ok": false,
            "error_code": self.kind.code(),
            "error": self.message.clone(),
        });
        let obj = envelope.as_object_mut().expect("envelope is an object");
        if let Some(ref error_id) = self.error_id {
            obj.insert("error_id".to_string(), json!(error_id));
        }
        if let Some(ref details) = self.details {
            // An empty details object is omitted, matching the wire contract
            if !details.as_object().map(|m| m.is_empty()).unwrap_or(false) {
                obj.insert("details".to_string(), details.clone());
            }
        }
        envelope
    }
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "task", id } => Self::task_not_found(&id),
            StoreError::NotFound { entity, id } => {
                Self::new(ErrorKind::TaskNotFound, format!("{} not found: {}", entity, id))
                    .with_details(json!({"entity": entity, "id": id}))
            }
            StoreError::IllegalTransition { entity, from, to } => Self::new(
                ErrorKind::InvalidParams,
                format!("Illegal {} state transition: {} -> {}", entity, from, to),
            ),
            other => {
                let error_id = generate_error_id();
                tracing::error!(%error_id, error = %other, "Store failure surfaced as INTERNAL_ERROR");
                Self::new(ErrorKind::InternalError, "An unexpected internal error occurred")
                    .with_error_id(error_id)
            }
        }
    }
}

/// Generate a unique correlation id for log correlation: `err_` + 12 hex
pub fn generate_error_id() -> String {
    use rand::Rng;
    let bytes: [u8; 6] = rand::rng().random();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("err_{}", hex)
}
