//! Structural schema validation — the gate between raw JSON text and the
//! typed [`FormSchema`] model.
//!
//! Validation is depth-first, left-to-right, first error wins. Duplicate id
//! detection is global: one seen-set is threaded through the whole recursion,
//! so an id reused anywhere in the tree (field or group, any nesting) is
//! reported at its second occurrence.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::FormError;
use crate::schema::{FieldType, FormSchema};

/// Parse and structurally validate raw schema text.
///
/// Fails with [`FormError::SchemaSyntax`] on malformed JSON and
/// [`FormError::SchemaShape`] (path-qualified) on any structural violation.
/// A schema that passes this gate upholds every model invariant: globally
/// unique non-empty ids, recognized field types, options on select/radio.
pub fn parse_form_schema(text: &str) -> Result<FormSchema, FormError> {
    let parsed: Value = serde_json::from_str(text)?;

    let root = parsed
        .as_object()
        .ok_or_else(|| FormError::shape("$", "Schema must be a JSON object"))?;

    if !root.get("title").is_some_and(Value::is_string) {
        return Err(FormError::shape(
            "$",
            "Schema must have a \"title\" field (string)",
        ));
    }

    let fields = root
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| FormError::shape("$", "Schema must have a \"fields\" array"))?;

    if fields.is_empty() {
        return Err(FormError::shape("$", "Schema must have at least one field"));
    }

    let mut seen_ids = HashSet::new();
    validate_items(fields, "fields", &mut seen_ids)?;

    // The structural pass guarantees serde cannot fail here, but a decode
    // error still surfaces as a shape error rather than a panic.
    serde_json::from_value(parsed).map_err(|err| FormError::shape("$", err.to_string()))
}

/// Cheap syntax probe: is the text well-formed JSON at all?
pub fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

fn validate_items(
    items: &[Value],
    path: &str,
    seen_ids: &mut HashSet<String>,
) -> Result<(), FormError> {
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{index}]");

        let obj = item
            .as_object()
            .ok_or_else(|| FormError::shape(&item_path, "Must be an object"))?;

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| FormError::shape(&item_path, "Missing or invalid \"id\" field"))?;

        if id.trim().is_empty() {
            return Err(FormError::shape(&item_path, "Field \"id\" cannot be empty"));
        }

        if !seen_ids.insert(id.to_string()) {
            return Err(FormError::shape(
                &item_path,
                format!("Duplicate field ID \"{id}\""),
            ));
        }

        let item_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| FormError::shape(&item_path, "Missing or invalid \"type\" field"))?;

        if item_type == "group" {
            if !obj.get("title").is_some_and(Value::is_string) {
                return Err(FormError::shape(
                    &item_path,
                    "Group must have a \"title\" field",
                ));
            }
            let children = obj.get("fields").and_then(Value::as_array).ok_or_else(|| {
                FormError::shape(&item_path, "Group must have a \"fields\" array")
            })?;
            validate_items(children, &format!("{item_path}.fields"), seen_ids)?;
        } else {
            validate_field(obj, item_type, &item_path)?;
        }
    }

    Ok(())
}

fn validate_field(
    obj: &serde_json::Map<String, Value>,
    field_type: &str,
    path: &str,
) -> Result<(), FormError> {
    if !obj.get("label").is_some_and(Value::is_string) {
        return Err(FormError::shape(path, "Field must have a \"label\""));
    }

    if !FieldType::WIRE_NAMES.contains(&field_type) {
        return Err(FormError::shape(
            path,
            format!(
                "Invalid field type \"{field_type}\". Must be one of: {}",
                FieldType::WIRE_NAMES.join(", ")
            ),
        ));
    }

    if field_type == "select" || field_type == "radio" {
        let options = obj.get("options").and_then(Value::as_array);
        if !options.is_some_and(|opts| !opts.is_empty()) {
            return Err(FormError::shape(
                path,
                format!("{field_type} field must have \"options\" array"),
            ));
        }
    }

    Ok(())
}
