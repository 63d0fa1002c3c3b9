//! Field reference resolution and dot-path access into the data record.
//!
//! Every field and group has exactly one absolute dot-path derived from its
//! position in the schema tree (`parent.child`). Schema authors may reference
//! fields either by bare id (resolved through the global id map — ids are
//! globally unique) or by explicit dotted path (passed through untouched,
//! kept for forward compatibility).

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::schema::SchemaNode;

/// Join a parent path and a child id; an empty parent yields the bare id.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

/// Walk the tree depth-first and record every id's absolute path.
///
/// Ids are globally unique (enforced by the parser), so each id maps to
/// exactly one path and the nested path always equals `parent_path.id`.
pub fn build_field_path_map(fields: &[SchemaNode]) -> BTreeMap<String, String> {
    let mut id_to_path = BTreeMap::new();
    walk(fields, "", &mut id_to_path);
    id_to_path
}

fn walk(items: &[SchemaNode], parent_path: &str, id_to_path: &mut BTreeMap<String, String>) {
    for item in items {
        let item_path = join_path(parent_path, item.id());
        id_to_path.insert(item.id().to_string(), item_path.clone());
        if let SchemaNode::Group(group) = item {
            walk(&group.fields, &item_path, id_to_path);
        }
    }
}

/// Resolve a field reference to an absolute path.
///
/// - Dotted references are treated as already absolute.
/// - Bare ids are looked up in the global id map.
/// - An unknown bare id falls back to a scope-relative join. The result may
///   name a nonexistent path; callers treat that as a recoverable default
///   (the dependency simply never becomes ready).
pub fn resolve_reference(
    reference: &str,
    scope_path: &str,
    id_to_path: &BTreeMap<String, String>,
) -> String {
    if reference.contains('.') {
        return reference.to_string();
    }

    if let Some(path) = id_to_path.get(reference) {
        return path.clone();
    }

    warn!(reference, scope_path, "unresolved field reference, falling back to scope join");
    join_path(scope_path, reference)
}

/// Read a value from the nested record by dot-path.
///
/// A literal top-level key wins over segment traversal, so flat records with
/// dotted keys keep working.
pub fn get_by_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let obj = data.as_object()?;
    if let Some(value) = obj.get(path) {
        return Some(value);
    }

    let mut current = data;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value into the nested record by dot-path, creating intermediate
/// objects as needed. A non-object intermediate is replaced.
pub fn set_by_path(data: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        return;
    }
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut current = data;
    for segment in &segments[..segments.len() - 1] {
        let obj = current.as_object_mut().expect("intermediate is an object");
        let entry = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }
    current
        .as_object_mut()
        .expect("parent is an object")
        .insert(segments[segments.len() - 1].to_string(), value);
}

/// Remove a value from the nested record by dot-path.
///
/// Intermediate objects are left in place even when emptied — hidden groups
/// collapse by removing each leaf, not by pruning containers.
pub fn remove_by_path(data: &mut Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = data;
    for segment in &segments[..segments.len() - 1] {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current
        .as_object_mut()?
        .remove(segments[segments.len() - 1])
}
