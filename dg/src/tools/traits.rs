//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::ToolError;

/// A named operation exposed to the external agent
///
/// Handlers return the tool-specific success fields; the router validates
/// input against the tool's schema beforehand and wraps the return value in
/// the `{ok:true, ...}` envelope afterwards. Failures are raised as
/// [`ToolError`] and never leak as raw implementation errors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as dispatched over the wire
    fn name(&self) -> &'static str;

    /// Human-readable description (introspection)
    fn description(&self) -> &'static str;

    /// Execute the tool
    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError>;
}
