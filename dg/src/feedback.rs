//! Feedback handler - human-in-the-loop corrections
//!
//! Six actions across three scopes:
//! - domain: `domain_block`, `domain_unblock`, `domain_clear_override`
//! - claim: `claim_reject`, `claim_restore`
//! - edge: `edge_correct`

use serde_json::{Value, json};
use tracing::info;

use crate::context::AppContext;
use crate::errors::ToolError;

/// Patterns that may never be blocked: whole TLDs and catch-alls
pub const FORBIDDEN_PATTERNS: [&str; 8] = ["*", "**", "*.com", "*.co.jp", "*.org", "*.net", "*.gov", "*.edu"];

const ACTIONS: &str = "domain_block, domain_unblock, domain_clear_override, claim_reject, claim_restore, edge_correct";

/// Route a feedback action to its handler
pub async fn handle_feedback(ctx: &AppContext, action: &str, args: &Value) -> Result<Value, ToolError> {
    match action {
        "domain_block" => domain_block(ctx, args).await,
        "domain_unblock" => domain_unblock(ctx, args).await,
        "domain_clear_override" => domain_clear_override(ctx, args).await,
        "claim_reject" => set_claim_adoption(ctx, args, "not_adopted").await,
        "claim_restore" => set_claim_adoption(ctx, args, "adopted").await,
        "edge_correct" => edge_correct(ctx, args).await,
        other => Err(ToolError::invalid_params(
            format!("Unknown action: {}", other),
            "action",
            &format!("one of: {}", ACTIONS),
        )),
    }
}

/// Validate a domain pattern: non-empty after trimming, not a forbidden
/// TLD-level pattern, and a well-formed glob.
fn validate_domain_pattern(raw: &str) -> Result<String, ToolError> {
    let pattern = raw.trim();
    if pattern.is_empty() {
        return Err(ToolError::invalid_params(
            "domain_pattern is required and cannot be empty",
            "domain_pattern",
            "non-empty domain pattern",
        ));
    }

    if FORBIDDEN_PATTERNS.contains(&pattern) {
        return Err(ToolError::invalid_params(
            format!(
                "Forbidden domain pattern: '{}'. Cannot block/unblock at TLD level.",
                pattern
            ),
            "domain_pattern",
            "specific domain pattern (e.g., 'example.com', '*.example.com')",
        )
        .with_details(json!({
            "param_name": "domain_pattern",
            "expected": "specific domain pattern (e.g., 'example.com', '*.example.com')",
            "forbidden_patterns": FORBIDDEN_PATTERNS,
        })));
    }

    if glob::Pattern::new(pattern).is_err() {
        return Err(ToolError::invalid_params(
            format!("Invalid domain pattern: '{}'", pattern),
            "domain_pattern",
            "valid glob pattern",
        ));
    }

    Ok(pattern.to_string())
}

fn domain_pattern_arg(args: &Value) -> Result<String, ToolError> {
    validate_domain_pattern(args.get("domain_pattern").and_then(Value::as_str).unwrap_or_default())
}

async fn domain_block(ctx: &AppContext, args: &Value) -> Result<Value, ToolError> {
    let pattern = domain_pattern_arg(args)?;
    let note = args.get("reason").and_then(Value::as_str);

    ctx.store
        .upsert_domain_rule(&pattern, "block", "manual", "low", None, note.or(Some("Blocked via feedback")))
        .await?;
    ctx.bus.signal_all();
    info!(domain = %pattern, "Feedback: domain blocked");

    Ok(json!({"action": "domain_block", "domain_pattern": pattern}))
}

async fn domain_unblock(ctx: &AppContext, args: &Value) -> Result<Value, ToolError> {
    let pattern = domain_pattern_arg(args)?;

    let removed = ctx.store.delete_domain_rule(&pattern).await?;
    if removed {
        ctx.bus.signal_all();
    }
    info!(domain = %pattern, removed, "Feedback: domain unblocked");

    Ok(json!({"action": "domain_unblock", "domain_pattern": pattern, "removed": removed}))
}

async fn domain_clear_override(ctx: &AppContext, args: &Value) -> Result<Value, ToolError> {
    let pattern = domain_pattern_arg(args)?;

    let removed = ctx.store.delete_domain_rule(&pattern).await?;
    if removed {
        ctx.bus.signal_all();
    }
    info!(domain = %pattern, removed, "Feedback: domain override cleared");

    Ok(json!({"action": "domain_clear_override", "domain_pattern": pattern, "removed": removed}))
}

async fn set_claim_adoption(ctx: &AppContext, args: &Value, adoption: &str) -> Result<Value, ToolError> {
    let claim_id = args.get("claim_id").and_then(Value::as_str).unwrap_or_default();
    if claim_id.is_empty() {
        return Err(ToolError::invalid_params(
            "claim_id is required",
            "claim_id",
            "non-empty claim id",
        ));
    }

    ctx.store.set_claim_adoption(claim_id, adoption).await?;
    info!(%claim_id, %adoption, "Feedback: claim adoption set");

    let action = if adoption == "adopted" { "claim_restore" } else { "claim_reject" };
    Ok(json!({"action": action, "claim_id": claim_id, "adoption": adoption}))
}

async fn edge_correct(ctx: &AppContext, args: &Value) -> Result<Value, ToolError> {
    let edge_id = args.get("edge_id").and_then(Value::as_str).unwrap_or_default();
    if edge_id.is_empty() {
        return Err(ToolError::invalid_params("edge_id is required", "edge_id", "non-empty edge id"));
    }

    let relation = args.get("relation").and_then(Value::as_str).unwrap_or_default();
    if !["supports", "refutes", "neutral"].contains(&relation) {
        return Err(ToolError::invalid_params(
            format!("relation must be 'supports', 'refutes', or 'neutral', got: {}", relation),
            "relation",
            "one of: supports, refutes, neutral",
        ));
    }

    // The correction sample is recorded even when the label is unchanged:
    // ground-truth collection is the point, not just the update.
    let previous = ctx.store.correct_edge(edge_id, relation).await?;
    info!(%edge_id, %previous, %relation, "Feedback: edge corrected");

    Ok(json!({
        "action": "edge_correct",
        "edge_id": edge_id,
        "previous_relation": previous,
        "relation": relation,
    }))
}
