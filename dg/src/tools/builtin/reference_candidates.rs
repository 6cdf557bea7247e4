//! queue_reference_candidates - citation chasing
//!
//! Walks the `cites` edges of a task's pages, converts each cited resource
//! into a url or doi target (DOI-resolver URLs collapse to doi targets), and
//! optionally enqueues them through the regular dedup path.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::AppContext;
use crate::domain::target::extract_doi_from_url;
use crate::domain::{Priority, Target};
use crate::errors::ToolError;
use crate::tools::Tool;

pub struct QueueReferenceCandidatesTool;

#[async_trait]
impl Tool for QueueReferenceCandidatesTool {
    fn name(&self) -> &'static str {
        "queue_reference_candidates"
    }

    fn description(&self) -> &'static str {
        "Queue resources cited by this task's pages; supports whitelist/blacklist, limits, and dry runs"
    }

    async fn handle(&self, args: Value, ctx: &AppContext) -> Result<Value, ToolError> {
        let task_id = args.get("task_id").and_then(Value::as_str).unwrap_or_default();
        if task_id.is_empty() {
            return Err(ToolError::invalid_params("task_id is required", "task_id", "non-empty string"));
        }

        let include_ids = string_list(&args, "include_ids");
        let exclude_ids = string_list(&args, "exclude_ids");
        if include_ids.is_some() && exclude_ids.is_some() {
            return Err(ToolError::invalid_params(
                "include_ids and exclude_ids cannot be used together",
                "include_ids",
                "at most one of include_ids / exclude_ids",
            ));
        }

        let limit = args.get("limit").and_then(Value::as_u64).map(|l| l as usize);
        let dry_run = args.get("dry_run").and_then(Value::as_bool).unwrap_or(false);

        ctx.store.get_task_required(task_id).await?;

        let cites = ctx.store.edges_for_task(task_id, Some("cites")).await?;
        let pages = ctx.store.pages_for_task(task_id).await?;
        let urls_by_page: HashMap<&str, &str> =
            pages.iter().map(|p| (p.id.as_str(), p.url.as_str())).collect();

        let mut candidates = Vec::new();
        for edge in cites.iter().filter(|e| e.src_type == "page" && e.dst_type == "page") {
            if let Some(ref include) = include_ids
                && !include.contains(&edge.id)
            {
                continue;
            }
            if let Some(ref exclude) = exclude_ids
                && exclude.contains(&edge.id)
            {
                continue;
            }

            let Some(url) = urls_by_page.get(edge.dst_id.as_str()) else {
                continue;
            };

            // DOI-resolver URLs become doi targets; everything else is a
            // url target chased at depth 1.
            let candidate = match extract_doi_from_url(url) {
                Some(doi) => json!({
                    "citation_edge_id": &edge.id,
                    "kind": "doi",
                    "doi": doi,
                    "url": url,
                }),
                None => json!({
                    "citation_edge_id": &edge.id,
                    "kind": "url",
                    "url": url,
                    "doi": Value::Null,
                }),
            };
            candidates.push(candidate);

            if let Some(limit) = limit
                && candidates.len() >= limit
            {
                break;
            }
        }

        if dry_run {
            return Ok(json!({
                "candidates": candidates,
                "queued_count": 0,
                "skipped_count": 0,
                "target_ids": [],
                "dry_run": true,
            }));
        }

        let targets: Vec<Target> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let descriptor = match candidate["kind"].as_str() {
                    Some("doi") => json!({
                        "kind": "doi",
                        "doi": candidate["doi"].clone(),
                        "reason": "citation_chase",
                        "context": {"citation_edge_id": candidate["citation_edge_id"].clone()},
                    }),
                    _ => json!({
                        "kind": "url",
                        "url": candidate["url"].clone(),
                        "depth": 1,
                        "reason": "citation_chase",
                        "context": {"citation_edge_id": candidate["citation_edge_id"].clone()},
                    }),
                };
                Target::parse(&descriptor, index)
            })
            .collect::<Result<_, _>>()?;

        let report = if targets.is_empty() {
            None
        } else {
            let options = args.get("options").cloned().unwrap_or_else(|| json!({}));
            Some(ctx.queue.enqueue_targets(task_id, &targets, &options, Priority::Medium).await?)
        };

        let (queued_count, skipped_count, target_ids, task_resumed) = match report {
            Some(r) => (r.queued_count, r.skipped_count, r.target_ids, r.task_resumed),
            None => (0, 0, Vec::new(), false),
        };

        Ok(json!({
            "candidates": candidates,
            "queued_count": queued_count,
            "skipped_count": skipped_count,
            "target_ids": target_ids,
            "task_resumed": task_resumed,
            "dry_run": false,
        }))
    }
}

fn string_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|list| {
        list.iter().filter_map(Value::as_str).map(str::to_string).collect()
    })
}
