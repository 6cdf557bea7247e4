//! Per-tool JSON schema registry
//!
//! One schema file per tool, `{"input_schema": ..., "output_schema": ...}`,
//! embedded at compile time and optionally overridden from a directory at
//! startup. Input validators are compiled once; the schemas themselves are
//! served unchanged through the `list_tools` introspection request.

use std::collections::HashMap;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ToolError;

/// Embedded schema sources, one per tool plus the shared error envelope
const EMBEDDED: &[(&str, &str)] = &[
    ("create_task", include_str!("../../schemas/create_task.json")),
    ("queue_targets", include_str!("../../schemas/queue_targets.json")),
    (
        "queue_reference_candidates",
        include_str!("../../schemas/queue_reference_candidates.json"),
    ),
    ("get_status", include_str!("../../schemas/get_status.json")),
    ("stop_task", include_str!("../../schemas/stop_task.json")),
    ("get_materials", include_str!("../../schemas/get_materials.json")),
    ("calibration_metrics", include_str!("../../schemas/calibration_metrics.json")),
    ("calibration_rollback", include_str!("../../schemas/calibration_rollback.json")),
    ("get_auth_queue", include_str!("../../schemas/get_auth_queue.json")),
    ("resolve_auth", include_str!("../../schemas/resolve_auth.json")),
    ("notify_user", include_str!("../../schemas/notify_user.json")),
    ("wait_for_user", include_str!("../../schemas/wait_for_user.json")),
    ("feedback", include_str!("../../schemas/feedback.json")),
    ("error", include_str!("../../schemas/error.json")),
];

struct ToolSchemas {
    input: Value,
    output: Value,
    validator: Validator,
}

/// Registry of tool input/output schemas with compiled input validators
pub struct SchemaRegistry {
    tools: HashMap<String, ToolSchemas>,
}

impl SchemaRegistry {
    /// Build the registry from the embedded schemas
    pub fn load() -> eyre::Result<Self> {
        Self::load_with_overrides(None)
    }

    /// Build the registry, overriding embedded schemas with any
    /// `{tool}.json` files found in `dir`
    pub fn load_with_overrides(dir: Option<&Path>) -> eyre::Result<Self> {
        let mut tools = HashMap::new();

        for (name, source) in EMBEDDED {
            let raw = match dir.map(|d| d.join(format!("{}.json", name))) {
                Some(path) if path.exists() => {
                    debug!(tool = name, path = %path.display(), "Schema override");
                    std::fs::read_to_string(&path)?
                }
                _ => (*source).to_string(),
            };

            let parsed: Value = serde_json::from_str(&raw)
                .map_err(|e| eyre::eyre!("Schema for '{}' is not valid JSON: {}", name, e))?;
            // A missing input schema accepts anything
            let input = parsed.get("input_schema").cloned().unwrap_or(Value::Bool(true));
            let output = parsed.get("output_schema").cloned().unwrap_or(Value::Bool(true));

            let validator = jsonschema::validator_for(&input)
                .map_err(|e| eyre::eyre!("Input schema for '{}' does not compile: {}", name, e))?;

            tools.insert(name.to_string(), ToolSchemas { input, output, validator });
        }

        info!(count = tools.len(), "Schema registry loaded");
        Ok(Self { tools })
    }

    /// Whether a schema is registered for the tool
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    /// Registered tool names (excludes the shared error schema), sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().filter(|n| n.as_str() != "error").cloned().collect();
        names.sort();
        names
    }

    /// The declared input schema for a tool
    pub fn input_schema(&self, tool: &str) -> Option<&Value> {
        self.tools.get(tool).map(|t| &t.input)
    }

    /// The declared output schema for a tool
    pub fn output_schema(&self, tool: &str) -> Option<&Value> {
        self.tools.get(tool).map(|t| &t.output)
    }

    /// Validate tool arguments against the input schema.
    ///
    /// The first violation is surfaced as `INVALID_PARAMS`; missing required
    /// properties read `{name} is required` so clients get the same message
    /// whether the check fires here or in a handler.
    pub fn validate_input(&self, tool: &str, args: &Value) -> Result<(), ToolError> {
        let Some(schemas) = self.tools.get(tool) else {
            return Ok(());
        };

        let Some(error) = schemas.validator.iter_errors(args).next() else {
            return Ok(());
        };

        if let jsonschema::error::ValidationErrorKind::Required { property } = &error.kind() {
            let property = property.as_str().unwrap_or_default().to_string();
            return Err(ToolError::invalid_params(
                format!("{} is required", property),
                &property,
                "required parameter",
            ));
        }

        let path = error.instance_path().to_string();
        let param_name = if path.is_empty() {
            "arguments".to_string()
        } else {
            path.trim_start_matches('/').replace('/', ".")
        };

        Err(ToolError::invalid_params(
            format!("Invalid arguments for {}: {}", tool, error),
            &param_name,
            "arguments matching the tool's input schema",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_all_tools_load() {
        let registry = SchemaRegistry::load().unwrap();
        let names = registry.tool_names();

        for expected in [
            "create_task",
            "queue_targets",
            "queue_reference_candidates",
            "get_status",
            "stop_task",
            "get_materials",
            "calibration_metrics",
            "calibration_rollback",
            "get_auth_queue",
            "resolve_auth",
            "notify_user",
            "wait_for_user",
            "feedback",
        ] {
            assert!(names.contains(&expected.to_string()), "missing schema: {}", expected);
        }
        assert_eq!(names.len(), 13);
    }

    #[test]
    fn test_missing_required_property_message() {
        let registry = SchemaRegistry::load().unwrap();

        let err = registry.validate_input("create_task", &json!({})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert_eq!(err.message, "query is required");
        assert_eq!(err.details.unwrap()["param_name"], "query");
    }

    #[test]
    fn test_wrong_type_rejected_with_path() {
        let registry = SchemaRegistry::load().unwrap();

        let err = registry
            .validate_input("queue_targets", &json!({"task_id": "task_1", "targets": "not-an-array"}))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert_eq!(err.details.unwrap()["param_name"], "targets");
    }

    #[test]
    fn test_enum_violation_names_field() {
        let registry = SchemaRegistry::load().unwrap();

        let err = registry
            .validate_input("notify_user", &json!({"event": "party", "payload": {}}))
            .unwrap_err();
        let details = err.details.unwrap();
        assert!(details["param_name"].as_str().unwrap().contains("event"));
    }

    #[test]
    fn test_valid_input_passes() {
        let registry = SchemaRegistry::load().unwrap();

        registry
            .validate_input("create_task", &json!({"query": "caffeine effects"}))
            .unwrap();
        registry
            .validate_input(
                "queue_targets",
                &json!({"task_id": "task_1", "targets": [{"kind": "query", "query": "a"}]}),
            )
            .unwrap();
        registry
            .validate_input("get_status", &json!({"task_id": "task_1", "wait": 5, "detail": "summary"}))
            .unwrap();
    }

    #[test]
    fn test_materials_output_schema_contract() {
        // The evidence graph and citation network shapes are a wire contract;
        // these assertions guard against accidental schema drift.
        let registry = SchemaRegistry::load().unwrap();
        let schema = registry.output_schema("get_materials").unwrap();
        let props = &schema["properties"];

        // citation_network exists and is optional (nullable)
        let cn_type = &props["citation_network"]["type"];
        assert!(
            cn_type.as_array().map(|t| t.contains(&json!("null"))).unwrap_or(false),
            "citation_network must be nullable"
        );

        // relation enum contains exactly the five graph relations
        let relation_enum: Vec<_> = props["evidence_graph"]["properties"]["edges"]["items"]["properties"]["relation"]
            ["enum"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        let expected: std::collections::HashSet<_> =
            ["supports", "refutes", "neutral", "cites", "evidence_source"].into_iter().collect();
        let actual: std::collections::HashSet<_> = relation_enum.iter().map(String::as_str).collect();
        assert_eq!(actual, expected);

        // nodes carry node_type and obj_id
        let node_props = &props["evidence_graph"]["properties"]["nodes"]["items"]["properties"];
        assert!(node_props.get("node_type").is_some());
        assert!(node_props.get("obj_id").is_some());

        // stats present
        assert!(props["evidence_graph"]["properties"].get("stats").is_some());

        // citation_count and year are nullable for fault tolerance
        let page_props = &props["citation_network"]["properties"]["source_pages"]["items"]["properties"];
        for field in ["citation_count", "year"] {
            let types = page_props[field]["type"].as_array().unwrap();
            assert!(types.contains(&json!("null")), "{} must allow null", field);
        }
    }

    #[test]
    fn test_error_schema_accepts_failure_envelope() {
        let registry = SchemaRegistry::load().unwrap();
        let schema = registry.output_schema("error").unwrap();
        let validator = jsonschema::validator_for(schema).unwrap();

        let envelope = crate::errors::ToolError::task_not_found("task_x").to_envelope();
        assert!(validator.is_valid(&envelope));

        // ok:true is not a failure envelope
        assert!(!validator.is_valid(&json!({"ok": true})));
    }

    #[test]
    fn test_override_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("create_task.json"),
            r#"{"input_schema": {"type": "object"}, "output_schema": {"type": "object", "x-override": true}}"#,
        )
        .unwrap();

        let registry = SchemaRegistry::load_with_overrides(Some(dir.path())).unwrap();
        // Override drops the required list, so empty args now pass
        registry.validate_input("create_task", &json!({})).unwrap();
        assert_eq!(registry.output_schema("create_task").unwrap()["x-override"], true);
    }
}
