//! Public identifier generation
//!
//! All IDs exposed to clients use the format `{prefix}_{12-hex}`:
//! `task_` for tasks, `tq_`/`tu_`/`td_` for query/url/doi targets,
//! `iq_` for intervention items, `err_` for error correlation.

/// Generate a public id with the given prefix
pub fn public_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4();
    let hex = uuid.simple().to_string();
    format!("{}_{}", prefix, &hex[..12])
}
