//! Resolution of `autoFill` declarations to absolute field paths.
//!
//! References stay ergonomic for schema authors: a dotted reference is taken
//! as an absolute path, a bare id goes through the globally unique id map,
//! and an unknown bare id falls back to a join against the declaring scope.
//! The scope is the enclosing group for a field and the group itself for a
//! group carrying its own declaration.

use crate::path::{build_field_path_map, join_path, resolve_reference};
use crate::schema::{AutoFillConfig, SchemaNode};

/// A dependency or target reference with both its declared key (used to name
/// request parameters and read response payloads) and its resolved path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFieldRef {
    pub key: String,
    pub path: String,
}

/// One `autoFill` declaration with every reference resolved.
///
/// Immutable once computed; recompute only when the schema changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAutoFillConfig {
    /// Absolute path of the declaring field — identifies the config.
    pub key: String,
    pub api_endpoint: String,
    pub depends_on: Vec<ResolvedFieldRef>,
    pub target_fields: Vec<ResolvedFieldRef>,
}

/// Walk the schema tree and resolve every auto-fill declaration.
pub fn resolve_auto_fill_configs(fields: &[SchemaNode]) -> Vec<ResolvedAutoFillConfig> {
    let id_to_path = build_field_path_map(fields);
    let mut resolved = Vec::new();
    collect(fields, "", &id_to_path, &mut resolved);
    resolved
}

fn collect(
    items: &[SchemaNode],
    parent_path: &str,
    id_to_path: &std::collections::BTreeMap<String, String>,
    resolved: &mut Vec<ResolvedAutoFillConfig>,
) {
    for item in items {
        let item_path = join_path(parent_path, item.id());
        match item {
            SchemaNode::Field(field) => {
                if let Some(config) = &field.auto_fill {
                    resolved.push(resolve_config(config, &item_path, parent_path, id_to_path));
                }
            }
            SchemaNode::Group(group) => {
                collect(&group.fields, &item_path, id_to_path, resolved);
            }
        }
    }
}

fn resolve_config(
    config: &AutoFillConfig,
    item_path: &str,
    scope_path: &str,
    id_to_path: &std::collections::BTreeMap<String, String>,
) -> ResolvedAutoFillConfig {
    let resolve_ref = |reference: &String| ResolvedFieldRef {
        key: reference.clone(),
        path: resolve_reference(reference, scope_path, id_to_path),
    };
    ResolvedAutoFillConfig {
        key: item_path.to_string(),
        api_endpoint: config.api_endpoint.clone(),
        depends_on: config.depends_on.iter().map(resolve_ref).collect(),
        target_fields: config.target_fields.iter().map(resolve_ref).collect(),
    }
}
