//! Intervention queue operations
//!
//! Listing with optional grouping for `get_auth_queue`, resolution for
//! `resolve_auth`, and the enqueue helper action handlers use when a fetch
//! hits an authentication wall.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::info;

use dredgestore::{InterventionFilter, InterventionRow, Store};

use crate::bus::ChangeBus;
use crate::domain::public_id;
use crate::errors::ToolError;

/// Grouping modes for the auth queue listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    None,
    Domain,
    Type,
}

impl std::str::FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "domain" => Ok(Self::Domain),
            "type" => Ok(Self::Type),
            _ => Err(format!("Unknown group_by: {}", s)),
        }
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Domain => write!(f, "domain"),
            Self::Type => write!(f, "type"),
        }
    }
}

fn item_json(item: &InterventionRow) -> Value {
    json!({
        "queue_id": &item.id,
        "task_id": &item.task_id,
        "url": &item.url,
        "domain": &item.domain,
        "auth_type": &item.auth_type,
        "priority": &item.priority,
        "status": &item.status,
        "created_at": &item.created_at,
    })
}

/// Queue a new intervention request; returns the queue id
pub async fn enqueue(
    store: &Store,
    bus: &ChangeBus,
    task_id: &str,
    url: &str,
    domain: &str,
    auth_type: &str,
    priority: &str,
) -> Result<String, ToolError> {
    let queue_id = public_id("iq");
    store.insert_intervention(&queue_id, task_id, url, domain, auth_type, priority).await?;
    bus.signal(task_id);
    info!(%queue_id, %task_id, %domain, "Intervention queued");
    Ok(queue_id)
}

/// List pending intervention items, flat or grouped
pub async fn list(
    store: &Store,
    task_id: Option<&str>,
    priority_filter: Option<&str>,
    group_by: GroupBy,
) -> Result<Value, ToolError> {
    let filter = InterventionFilter {
        task_id: task_id.map(str::to_string),
        priority: priority_filter.map(str::to_string),
    };
    let items = store.pending_interventions(&filter).await?;
    let total_count = items.len();

    let mut result = json!({
        "total_count": total_count,
        "group_by": group_by.to_string(),
    });

    match group_by {
        GroupBy::None => {
            result["items"] = Value::Array(items.iter().map(item_json).collect());
        }
        GroupBy::Domain | GroupBy::Type => {
            let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
            for item in &items {
                let key = match group_by {
                    GroupBy::Domain => item.domain.clone(),
                    _ => item.auth_type.clone(),
                };
                groups.entry(key).or_default().push(item_json(item));
            }
            result["groups"] = json!(groups);
        }
    }

    Ok(result)
}

/// Resolution target: one item or a whole domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveTarget {
    Item { queue_id: String },
    Domain { domain: String },
}

impl ResolveTarget {
    /// Parse the conditional-required target fields from tool arguments
    pub fn from_args(args: &Value) -> Result<Self, ToolError> {
        match args.get("target").and_then(Value::as_str).unwrap_or_default() {
            "item" => {
                let queue_id = args.get("queue_id").and_then(Value::as_str).unwrap_or_default();
                if queue_id.is_empty() {
                    return Err(ToolError::invalid_params(
                        "queue_id is required when target is 'item'",
                        "queue_id",
                        "non-empty queue id",
                    ));
                }
                Ok(Self::Item {
                    queue_id: queue_id.to_string(),
                })
            }
            "domain" => {
                let domain = args.get("domain").and_then(Value::as_str).unwrap_or_default();
                if domain.is_empty() {
                    return Err(ToolError::invalid_params(
                        "domain is required when target is 'domain'",
                        "domain",
                        "non-empty domain",
                    ));
                }
                Ok(Self::Domain {
                    domain: domain.to_string(),
                })
            }
            other => Err(ToolError::invalid_params(
                format!("target must be 'item' or 'domain', got: {}", other),
                "target",
                "'item' or 'domain'",
            )),
        }
    }
}

/// Resolve pending items as completed or skipped
pub async fn resolve(
    store: &Store,
    bus: &ChangeBus,
    target: ResolveTarget,
    action: &str,
    success: Option<bool>,
) -> Result<Value, ToolError> {
    let status = match action {
        "complete" => "resolved",
        "skip" => "skipped",
        other => {
            return Err(ToolError::invalid_params(
                format!("action must be 'complete' or 'skip', got: {}", other),
                "action",
                "'complete' or 'skip'",
            ));
        }
    };

    let (resolved_count, target_name) = match &target {
        ResolveTarget::Item { queue_id } => {
            let count = store.resolve_intervention_item(queue_id, status, success).await?;
            (count, "item")
        }
        ResolveTarget::Domain { domain } => {
            let count = store.resolve_intervention_domain(domain, status, success).await?;
            (count, "domain")
        }
    };

    if resolved_count > 0 {
        bus.signal_all();
    }
    info!(target = target_name, %status, resolved_count, "Interventions resolved");

    Ok(json!({
        "target": target_name,
        "action": action,
        "resolved_count": resolved_count,
    }))
}
