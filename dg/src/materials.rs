//! Research materials assembly for `get_materials`
//!
//! Read-only composition of claims, kept fragments, the evidence graph, and
//! the citation network. The graph exposes only the five analytic relations;
//! `origin` edges are provenance bookkeeping and stay internal.

use std::collections::BTreeSet;

use serde_json::{Value, json};

use dredgestore::Store;

use crate::errors::ToolError;

/// Relations surfaced in the evidence graph
const GRAPH_RELATIONS: [&str; 5] = ["supports", "refutes", "neutral", "cites", "evidence_source"];

/// Build the materials envelope for a task
pub async fn get_materials(
    store: &Store,
    task_id: &str,
    include_graph: bool,
    include_citations: bool,
) -> Result<Value, ToolError> {
    let task = store.get_task(task_id).await?.ok_or_else(|| ToolError::task_not_found(task_id))?;

    let claims = store.claims_for_task(&task.id).await?;
    let fragments = store.kept_fragments(&task.id).await?;
    let page_count = store.page_count(&task.id).await?;

    let claims_json: Vec<Value> = claims
        .iter()
        .map(|c| {
            json!({
                "claim_id": &c.id,
                "text": &c.text,
                "adoption": &c.adoption,
                "confidence": c.confidence,
            })
        })
        .collect();

    let fragments_json: Vec<Value> = fragments
        .iter()
        .map(|f| {
            json!({
                "fragment_id": &f.id,
                "page_id": &f.page_id,
                "text": &f.text,
            })
        })
        .collect();

    let mut envelope = json!({
        "task_id": task.id,
        "claims": claims_json,
        "fragments": fragments_json,
        "summary": {
            "claim_count": claims.len(),
            "fragment_count": fragments.len(),
            "page_count": page_count,
        },
    });

    if include_graph {
        envelope["evidence_graph"] = evidence_graph(store, &task.id).await?;
    }
    if include_citations {
        envelope["citation_network"] = citation_network(store, &task.id).await?;
    }

    Ok(envelope)
}

async fn evidence_graph(store: &Store, task_id: &str) -> Result<Value, ToolError> {
    let edges = store.edges_for_task(task_id, None).await?;

    let mut nodes: BTreeSet<(String, String)> = BTreeSet::new();
    let mut edges_json = Vec::new();
    let mut supports_count = 0;
    let mut refutes_count = 0;

    for edge in &edges {
        if !GRAPH_RELATIONS.contains(&edge.relation.as_str()) {
            continue;
        }

        nodes.insert((edge.src_type.clone(), edge.src_id.clone()));
        nodes.insert((edge.dst_type.clone(), edge.dst_id.clone()));

        match edge.relation.as_str() {
            "supports" => supports_count += 1,
            "refutes" => refutes_count += 1,
            _ => {}
        }

        edges_json.push(json!({
            "edge_id": &edge.id,
            "src_type": &edge.src_type,
            "src_id": &edge.src_id,
            "dst_type": &edge.dst_type,
            "dst_id": &edge.dst_id,
            "relation": &edge.relation,
            "citation_source": Value::Null,
        }));
    }

    let nodes_json: Vec<Value> = nodes
        .iter()
        .map(|(node_type, obj_id)| json!({"node_type": node_type, "obj_id": obj_id}))
        .collect();

    Ok(json!({
        "nodes": nodes_json,
        "edges": edges_json,
        "stats": {
            "node_count": nodes_json.len(),
            "edge_count": edges_json.len(),
            "supports_count": supports_count,
            "refutes_count": refutes_count,
        },
    }))
}

async fn citation_network(store: &Store, task_id: &str) -> Result<Value, ToolError> {
    let cites = store.edges_for_task(task_id, Some("cites")).await?;
    let pages = store.pages_for_task(task_id).await?;

    let citing_ids: BTreeSet<&str> = cites.iter().filter(|e| e.src_type == "page").map(|e| e.src_id.as_str()).collect();

    let source_pages: Vec<Value> = pages
        .iter()
        .filter(|p| citing_ids.contains(p.id.as_str()))
        .map(|p| {
            json!({
                "page_id": &p.id,
                "url": &p.url,
                "title": &p.title,
                "citation_count": p.citation_count,
                "year": p.year,
            })
        })
        .collect();

    Ok(json!({
        "source_pages": source_pages,
        "edge_count": cites.len(),
    }))
}
