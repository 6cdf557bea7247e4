//! Target descriptors
//!
//! A target is the unit of queued work: a search query, a URL to ingest, or
//! a DOI to resolve. Targets arrive as JSON from the agent and are validated
//! field by field so every rejection names the offending `targets[i].field`.

use std::sync::OnceLock;

use serde_json::{Value, json};

use crate::errors::ToolError;

/// Valid reasons for url/doi ingestion
pub const VALID_REASONS: [&str; 2] = ["citation_chase", "manual"];

fn doi_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^10\.\d{4,}/\S+$").expect("DOI pattern compiles"))
}

/// A validated target descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Query {
        query: String,
        options: Value,
    },
    Url {
        url: String,
        depth: i64,
        reason: String,
        context: Value,
        policy: Value,
    },
    Doi {
        doi: String,
        reason: String,
        context: Value,
    },
}

impl Target {
    /// Validate one element of a `targets` array
    pub fn parse(value: &Value, index: usize) -> Result<Self, ToolError> {
        let obj = value.as_object().ok_or_else(|| {
            ToolError::invalid_params(
                format!("targets[{}] must be an object", index),
                &format!("targets[{}]", index),
                "object with kind field",
            )
        })?;

        let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "query" => {
                let query = obj.get("query").and_then(Value::as_str).unwrap_or_default();
                if query.is_empty() {
                    return Err(ToolError::invalid_params(
                        format!("targets[{}].query must be a non-empty string", index),
                        &format!("targets[{}].query", index),
                        "non-empty query string",
                    ));
                }
                Ok(Self::Query {
                    query: query.to_string(),
                    options: obj.get("options").cloned().unwrap_or_else(|| json!({})),
                })
            }
            "url" => {
                let url = obj.get("url").and_then(Value::as_str).unwrap_or_default();
                validate_url(url, index)?;

                let depth = match obj.get("depth") {
                    None => 0,
                    Some(v) => v.as_i64().filter(|d| *d >= 0).ok_or_else(|| {
                        ToolError::invalid_params(
                            format!("targets[{}].depth must be a non-negative integer", index),
                            &format!("targets[{}].depth", index),
                            "non-negative integer",
                        )
                    })?,
                };

                Ok(Self::Url {
                    url: url.to_string(),
                    depth,
                    reason: parse_reason(obj, index)?,
                    context: obj.get("context").cloned().unwrap_or_else(|| json!({})),
                    policy: obj.get("policy").cloned().unwrap_or_else(|| json!({})),
                })
            }
            "doi" => {
                let doi = obj.get("doi").and_then(Value::as_str).unwrap_or_default();
                validate_doi(doi, index)?;

                Ok(Self::Doi {
                    doi: doi.to_string(),
                    reason: parse_reason(obj, index)?,
                    context: obj.get("context").cloned().unwrap_or_else(|| json!({})),
                })
            }
            other => Err(ToolError::invalid_params(
                format!("targets[{}].kind must be 'query', 'url', or 'doi', got: {}", index, other),
                &format!("targets[{}].kind", index),
                "'query', 'url', or 'doi'",
            )),
        }
    }

    /// Kind discriminator as stored in `input_json.target.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Url { .. } => "url",
            Self::Doi { .. } => "doi",
        }
    }

    /// Prefix for the generated target id
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Query { .. } => "tq",
            Self::Url { .. } => "tu",
            Self::Doi { .. } => "td",
        }
    }

    /// Field name the dedup key is computed from
    pub fn dedup_path(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Url { .. } => "url",
            Self::Doi { .. } => "doi",
        }
    }

    /// Normalized dedup value: queries and urls verbatim, DOIs lowercased
    pub fn dedup_value(&self) -> String {
        match self {
            Self::Query { query, .. } => query.clone(),
            Self::Url { url, .. } => url.clone(),
            Self::Doi { doi, .. } => doi.to_lowercase(),
        }
    }

    /// The `target` object persisted inside a job's `input_json`
    pub fn to_input_value(&self) -> Value {
        match self {
            Self::Query { query, options } => json!({
                "kind": "query",
                "query": query,
                "options": options,
            }),
            Self::Url {
                url,
                depth,
                reason,
                context,
                policy,
            } => json!({
                "kind": "url",
                "url": url,
                "depth": depth,
                "reason": reason,
                "context": context,
                "policy": policy,
            }),
            Self::Doi { doi, reason, context } => json!({
                "kind": "doi",
                "doi": doi,
                "reason": reason,
                "context": context,
            }),
        }
    }
}

fn parse_reason(obj: &serde_json::Map<String, Value>, index: usize) -> Result<String, ToolError> {
    let reason = obj.get("reason").and_then(Value::as_str).unwrap_or("manual");
    if !VALID_REASONS.contains(&reason) {
        return Err(ToolError::invalid_params(
            format!("targets[{}].reason must be one of {:?}", index, VALID_REASONS),
            &format!("targets[{}].reason", index),
            "one of [\"citation_chase\", \"manual\"]",
        ));
    }
    Ok(reason.to_string())
}

fn validate_url(url: &str, index: usize) -> Result<(), ToolError> {
    if url.is_empty() {
        return Err(ToolError::invalid_params(
            format!("targets[{}].url must be a non-empty string", index),
            &format!("targets[{}].url", index),
            "non-empty URL string",
        ));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            ToolError::invalid_params(
                format!("targets[{}].url must use http or https scheme: {}", index, truncate(url, 100)),
                &format!("targets[{}].url", index),
                "http or https URL",
            )
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ToolError::invalid_params(
            format!("targets[{}].url must have a valid host: {}", index, truncate(url, 100)),
            &format!("targets[{}].url", index),
            "URL with valid host",
        ));
    }

    Ok(())
}

fn validate_doi(doi: &str, index: usize) -> Result<(), ToolError> {
    if doi.is_empty() {
        return Err(ToolError::invalid_params(
            format!("targets[{}].doi must be a non-empty string", index),
            &format!("targets[{}].doi", index),
            "non-empty DOI string",
        ));
    }

    if !doi_regex().is_match(doi) {
        return Err(ToolError::invalid_params(
            format!("targets[{}].doi is not a valid DOI format: {}", index, truncate(doi, 100)),
            &format!("targets[{}].doi", index),
            "DOI in format 10.XXXX/suffix",
        ));
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extract a DOI from a `doi.org` / `dx.doi.org` URL, stripping trailing
/// punctuation that citation scrapers commonly pick up. Returns `None` for
/// URLs on other hosts or with an invalid DOI path.
pub fn extract_doi_from_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let path = rest
        .strip_prefix("doi.org/")
        .or_else(|| rest.strip_prefix("dx.doi.org/"))
        .or_else(|| rest.strip_prefix("www.doi.org/"))?;

    let doi = path.trim_end_matches(['.', ',', ')', ';', ']']);
    if doi_regex().is_match(doi) { Some(doi.to_string()) } else { None }
}

/// Extract the host from an http(s) URL
pub fn url_domain(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() { None } else { Some(host) }
}
