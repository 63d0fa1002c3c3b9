//! Schema-to-validator compilation.
//!
//! The compiler walks the schema tree once and produces a [`Validator`] that
//! can run against any number of data snapshots. Compilation is a two-pass
//! design: per-field shape checks compose structurally (nested groups become
//! nested sub-validators), while rules carrying a `condition` are collected
//! into a whole-snapshot post-pass — "rule B active only if field A equals X"
//! cannot be expressed per-field without seeing the full record.
//!
//! Optionality policy: a field gated by `showWhen` is always optional (its
//! value is unregistered while hidden, so absence is the normal state); an
//! ungated field is optional unless it carries an unconditional `required`
//! rule. Regexes for `pattern`/`custom` rules compile here, so a bad pattern
//! fails schema compilation rather than every submit.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::FormError;
use crate::path::{get_by_path, join_path};
use crate::schema::{
    ConditionOperator, FieldConfig, FieldType, RuleCondition, SchemaNode, ValidationRule,
    ValidationType,
};

/// Result of running a [`Validator`] against a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// One message per failing absolute path.
    pub errors: BTreeMap<String, String>,
}

impl ValidationReport {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Compiled validation model for one schema.
#[derive(Debug)]
pub struct Validator {
    root: Vec<CompiledNode>,
    conditionals: Vec<CompiledConditional>,
}

#[derive(Debug)]
enum CompiledNode {
    Field(CompiledField),
    Group(CompiledGroup),
}

#[derive(Debug)]
struct CompiledField {
    path: String,
    base: BaseCheck,
    /// Unconditional rules, declaration order. First failure wins.
    rules: Vec<CompiledRule>,
    /// Absent/empty passes without running rules.
    optional: bool,
    /// Message reported when a non-optional field is absent.
    required_message: Option<String>,
}

#[derive(Debug)]
struct CompiledGroup {
    path: String,
    /// A `showWhen`-gated group is optional as a whole: when its subtree is
    /// absent from the snapshot, children are skipped entirely.
    optional: bool,
    children: Vec<CompiledNode>,
}

#[derive(Debug)]
enum BaseCheck {
    Text,
    Boolean,
    OneOf(Vec<String>),
}

#[derive(Debug)]
struct CompiledRule {
    check: RuleCheck,
    message: String,
}

#[derive(Debug)]
enum RuleCheck {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
}

#[derive(Debug)]
struct CompiledConditional {
    field_path: String,
    parent_path: String,
    condition: RuleCondition,
    check: RuleCheck,
    message: String,
}

/// Compile the schema tree into a reusable validator.
pub fn build_validator(fields: &[SchemaNode]) -> Result<Validator, FormError> {
    let mut conditionals = Vec::new();
    let root = compile_nodes(fields, "", &mut conditionals)?;
    Ok(Validator { root, conditionals })
}

impl Validator {
    /// Run every compiled check against a snapshot.
    ///
    /// Pure with respect to the snapshot: validating the same record twice
    /// yields the same report. Conditional failures land last, so when
    /// several conditional rules target one path the final one wins.
    pub fn validate(&self, snapshot: &Value) -> ValidationReport {
        let mut errors = BTreeMap::new();
        visit_nodes(&self.root, snapshot, &mut errors);

        for conditional in &self.conditionals {
            if !condition_holds(snapshot, &conditional.condition, &conditional.parent_path) {
                continue;
            }
            let value = get_by_path(snapshot, &conditional.field_path);
            if !conditional_rule_passes(&conditional.check, value) {
                errors.insert(conditional.field_path.clone(), conditional.message.clone());
            }
        }

        ValidationReport::from_errors(errors)
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

fn compile_nodes(
    items: &[SchemaNode],
    parent_path: &str,
    conditionals: &mut Vec<CompiledConditional>,
) -> Result<Vec<CompiledNode>, FormError> {
    let mut compiled = Vec::with_capacity(items.len());
    for item in items {
        let item_path = join_path(parent_path, item.id());
        match item {
            SchemaNode::Field(field) => {
                compiled.push(CompiledNode::Field(compile_field(
                    field,
                    &item_path,
                    parent_path,
                    conditionals,
                )?));
            }
            SchemaNode::Group(group) => {
                let children = compile_nodes(&group.fields, &item_path, conditionals)?;
                compiled.push(CompiledNode::Group(CompiledGroup {
                    path: item_path,
                    optional: group.show_when.is_some(),
                    children,
                }));
            }
        }
    }
    Ok(compiled)
}

fn compile_field(
    field: &FieldConfig,
    field_path: &str,
    parent_path: &str,
    conditionals: &mut Vec<CompiledConditional>,
) -> Result<CompiledField, FormError> {
    let base = match field.field_type {
        FieldType::Checkbox => BaseCheck::Boolean,
        FieldType::Select | FieldType::Radio => match &field.options {
            Some(options) if !options.is_empty() => {
                BaseCheck::OneOf(options.iter().map(|opt| opt.value.clone()).collect())
            }
            _ => BaseCheck::Text,
        },
        _ => BaseCheck::Text,
    };

    let all_rules = field.validations.as_deref().unwrap_or(&[]);
    let mut rules = Vec::new();
    let mut required_message = None;

    for rule in all_rules {
        if let Some(condition) = &rule.condition {
            if let Some(check) = compile_check(rule, field_path)? {
                conditionals.push(CompiledConditional {
                    field_path: field_path.to_string(),
                    parent_path: parent_path.to_string(),
                    condition: condition.clone(),
                    check,
                    message: rule.message.clone(),
                });
            }
            continue;
        }

        if rule.rule_type == ValidationType::Required && required_message.is_none() {
            required_message = Some(rule.message.clone());
        }
        if let Some(check) = compile_check(rule, field_path)? {
            rules.push(CompiledRule {
                check,
                message: rule.message.clone(),
            });
        }
    }

    let optional = field.show_when.is_some() || required_message.is_none();

    Ok(CompiledField {
        path: field_path.to_string(),
        base,
        rules,
        optional,
        required_message,
    })
}

/// Compile one rule into its runtime check. Rules whose payload type does
/// not fit the rule kind (a string `minLength`, a numeric `pattern`) are
/// inert and compile to nothing; a malformed regex is a schema error.
fn compile_check(rule: &ValidationRule, field_path: &str) -> Result<Option<RuleCheck>, FormError> {
    let check = match rule.rule_type {
        ValidationType::Required => Some(RuleCheck::Required),
        ValidationType::MinLength => rule
            .value
            .as_ref()
            .and_then(|v| v.as_usize())
            .map(RuleCheck::MinLength),
        ValidationType::MaxLength => rule
            .value
            .as_ref()
            .and_then(|v| v.as_usize())
            .map(RuleCheck::MaxLength),
        ValidationType::Pattern | ValidationType::Custom => {
            match rule.value.as_ref().and_then(|v| v.as_str()) {
                Some(source) => {
                    let regex = Regex::new(source).map_err(|err| {
                        FormError::shape(field_path, format!("Invalid pattern: {err}"))
                    })?;
                    Some(RuleCheck::Pattern(regex))
                }
                None => None,
            }
        }
    };
    Ok(check)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn visit_nodes(nodes: &[CompiledNode], snapshot: &Value, errors: &mut BTreeMap<String, String>) {
    for node in nodes {
        match node {
            CompiledNode::Field(field) => check_field(field, snapshot, errors),
            CompiledNode::Group(group) => {
                if group.optional && get_by_path(snapshot, &group.path).is_none() {
                    continue;
                }
                visit_nodes(&group.children, snapshot, errors);
            }
        }
    }
}

fn check_field(field: &CompiledField, snapshot: &Value, errors: &mut BTreeMap<String, String>) {
    let present = get_by_path(snapshot, &field.path).filter(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    });
    let Some(value) = present else {
        if !field.optional {
            let message = field
                .required_message
                .clone()
                .unwrap_or_else(|| "This field is required".to_string());
            errors.insert(field.path.clone(), message);
        }
        return;
    };

    if let Some(message) = base_check_error(&field.base, value) {
        errors.insert(field.path.clone(), message);
        return;
    }

    for rule in &field.rules {
        if !rule_passes(&rule.check, Some(value)) {
            errors.insert(field.path.clone(), rule.message.clone());
            return;
        }
    }
}

fn base_check_error(base: &BaseCheck, value: &Value) -> Option<String> {
    match base {
        BaseCheck::Text => (!value.is_string()).then(|| "Expected a text value".to_string()),
        BaseCheck::Boolean => (!value.is_boolean()).then(|| "Expected a boolean value".to_string()),
        BaseCheck::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|v| v == s) => None,
            _ => Some("Invalid option selected".to_string()),
        },
    }
}

fn rule_passes(check: &RuleCheck, value: Option<&Value>) -> bool {
    match check {
        RuleCheck::Required => match value {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(_) => true,
        },
        RuleCheck::MinLength(min) => match value {
            Some(Value::String(s)) => s.chars().count() >= *min,
            _ => true,
        },
        RuleCheck::MaxLength(max) => match value {
            Some(Value::String(s)) => s.chars().count() <= *max,
            _ => true,
        },
        RuleCheck::Pattern(regex) => match value {
            Some(Value::String(s)) => regex.is_match(s),
            _ => true,
        },
    }
}

/// `required` in the conditional post-pass treats a whitespace-only string
/// as unanswered; the unconditional check accepts any non-empty string.
fn conditional_rule_passes(check: &RuleCheck, value: Option<&Value>) -> bool {
    match (check, value) {
        (RuleCheck::Required, Some(Value::String(s))) => !s.trim().is_empty(),
        _ => rule_passes(check, value),
    }
}

/// Evaluate a rule condition against the snapshot. The reference is tried as
/// an absolute path first, then joined onto the rule owner's enclosing group.
fn condition_holds(snapshot: &Value, condition: &RuleCondition, parent_path: &str) -> bool {
    let absolute = get_by_path(snapshot, &condition.field);
    let observed = match absolute {
        Some(value) => Some(value),
        None => {
            let relative = join_path(parent_path, &condition.field);
            if relative != condition.field {
                get_by_path(snapshot, &relative)
            } else {
                None
            }
        }
    };

    let matches = observed.and_then(Value::as_str) == Some(condition.value.as_str());
    match condition.operator {
        ConditionOperator::Equals => matches,
        ConditionOperator::NotEquals => !matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_form_schema;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn validator_for(schema_json: &str) -> Validator {
        let schema = parse_form_schema(schema_json).unwrap();
        build_validator(&schema.fields).unwrap()
    }

    #[test]
    fn test_required_rule_blocks_empty_string() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "name", "type": "text", "label": "Name",
                    "validations": [{ "type": "required", "message": "Name is required" }]
                }]
            }"#,
        );

        let report = validator.validate(&json!({ "name": "" }));
        assert!(!report.valid);
        assert_eq!(report.errors["name"], "Name is required");

        let report = validator.validate(&json!({ "name": "John" }));
        assert!(report.valid);

        // Only zero-length text counts as unanswered here; whitespace is a value.
        let report = validator.validate(&json!({ "name": " " }));
        assert!(report.valid);
    }

    #[test]
    fn test_conditional_required_trims_whitespace() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "kind", "type": "text", "label": "Kind" },
                    {
                        "id": "note", "type": "text", "label": "Note",
                        "validations": [{
                            "type": "required", "message": "Note required",
                            "condition": { "field": "kind", "operator": "equals", "value": "other" }
                        }]
                    }
                ]
            }"#,
        );

        let report = validator.validate(&json!({ "kind": "other", "note": "   " }));
        assert_eq!(report.errors["note"], "Note required");
        assert!(validator
            .validate(&json!({ "kind": "other", "note": "details" }))
            .valid);
    }

    #[test]
    fn test_field_without_required_rule_is_optional() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "nick", "type": "text", "label": "Nick",
                    "validations": [{ "type": "minLength", "value": 3, "message": "Too short" }]
                }]
            }"#,
        );

        assert!(validator.validate(&json!({})).valid);
        assert!(!validator.validate(&json!({ "nick": "ab" })).valid);
        assert!(validator.validate(&json!({ "nick": "abc" })).valid);
    }

    #[test]
    fn test_length_and_pattern_rules_in_declaration_order() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "code", "type": "text-with-validation", "label": "Code",
                    "validations": [
                        { "type": "required", "message": "Required" },
                        { "type": "minLength", "value": 4, "message": "Min 4" },
                        { "type": "maxLength", "value": 6, "message": "Max 6" },
                        { "type": "pattern", "value": "^[0-9]+$", "message": "Digits only" }
                    ]
                }]
            }"#,
        );

        // First failing rule wins.
        assert_eq!(validator.validate(&json!({ "code": "ab" })).errors["code"], "Min 4");
        assert_eq!(
            validator.validate(&json!({ "code": "abcdefg" })).errors["code"],
            "Max 6"
        );
        assert_eq!(
            validator.validate(&json!({ "code": "abcd" })).errors["code"],
            "Digits only"
        );
        assert!(validator.validate(&json!({ "code": "1234" })).valid);
    }

    #[test]
    fn test_checkbox_required_must_be_true() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "terms", "type": "checkbox", "label": "Terms",
                    "validations": [{ "type": "required", "message": "Accept the terms" }]
                }]
            }"#,
        );

        assert_eq!(
            validator.validate(&json!({ "terms": false })).errors["terms"],
            "Accept the terms"
        );
        assert!(validator.validate(&json!({ "terms": true })).valid);
        // Absent counts as unanswered.
        assert!(!validator.validate(&json!({})).valid);
    }

    #[test]
    fn test_select_enforces_option_values() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "color", "type": "select", "label": "Color",
                    "options": [
                        { "label": "Red", "value": "red" },
                        { "label": "Blue", "value": "blue" }
                    ],
                    "validations": [{ "type": "required", "message": "Pick one" }]
                }]
            }"#,
        );

        assert!(validator.validate(&json!({ "color": "red" })).valid);
        assert_eq!(
            validator.validate(&json!({ "color": "green" })).errors["color"],
            "Invalid option selected"
        );
    }

    #[test]
    fn test_show_when_field_is_always_optional() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "mode", "type": "text", "label": "Mode" },
                    {
                        "id": "detail", "type": "text", "label": "Detail",
                        "showWhen": { "field": "mode", "equals": "advanced" },
                        "validations": [
                            { "type": "required", "message": "Detail required" },
                            { "type": "minLength", "value": 3, "message": "Min 3" }
                        ]
                    }
                ]
            }"#,
        );

        // Hidden (pruned) detail never blocks validation, required rule or not.
        assert!(validator.validate(&json!({ "mode": "simple" })).valid);
        // Gated fields stay optional even while visible and empty.
        assert!(validator.validate(&json!({ "mode": "advanced", "detail": "" })).valid);
        // A present non-empty value still runs the remaining rules.
        assert_eq!(
            validator
                .validate(&json!({ "mode": "advanced", "detail": "ab" }))
                .errors["detail"],
            "Min 3"
        );
    }

    #[test]
    fn test_gated_group_skipped_when_absent() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "hasCompany", "type": "text", "label": "Has company" },
                    {
                        "id": "company", "type": "group", "title": "Company",
                        "showWhen": { "field": "hasCompany", "equals": "yes" },
                        "fields": [{
                            "id": "vat", "type": "text", "label": "VAT",
                            "validations": [{ "type": "required", "message": "VAT required" }]
                        }]
                    }
                ]
            }"#,
        );

        assert!(validator.validate(&json!({ "hasCompany": "no" })).valid);
        assert_eq!(
            validator
                .validate(&json!({ "hasCompany": "yes", "company": { "vat": "" } }))
                .errors["company.vat"],
            "VAT required"
        );
    }

    #[test]
    fn test_conditional_rule_activates_on_sibling_value() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "contact", "type": "group", "title": "Contact",
                    "fields": [
                        { "id": "channel", "type": "text", "label": "Channel" },
                        {
                            "id": "phone", "type": "text", "label": "Phone",
                            "validations": [{
                                "type": "required", "message": "Phone required",
                                "condition": { "field": "channel", "operator": "equals", "value": "phone" }
                            }]
                        }
                    ]
                }]
            }"#,
        );

        // Condition resolves group-relative: contact.channel.
        let report = validator.validate(&json!({ "contact": { "channel": "phone" } }));
        assert_eq!(report.errors["contact.phone"], "Phone required");

        assert!(validator
            .validate(&json!({ "contact": { "channel": "email" } }))
            .valid);
        assert!(validator
            .validate(&json!({ "contact": { "channel": "phone", "phone": "123" } }))
            .valid);
    }

    #[test]
    fn test_not_equals_conditional() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "kind", "type": "text", "label": "Kind" },
                    {
                        "id": "reason", "type": "text", "label": "Reason",
                        "validations": [{
                            "type": "required", "message": "Reason required",
                            "condition": { "field": "kind", "operator": "notEquals", "value": "standard" }
                        }]
                    }
                ]
            }"#,
        );

        assert!(validator.validate(&json!({ "kind": "standard" })).valid);
        assert!(!validator.validate(&json!({ "kind": "special" })).valid);
    }

    #[test]
    fn test_last_conditional_failure_wins_per_path() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "mode", "type": "text", "label": "Mode" },
                    {
                        "id": "extra", "type": "text", "label": "Extra",
                        "validations": [
                            {
                                "type": "minLength", "value": 5, "message": "Too short",
                                "condition": { "field": "mode", "operator": "equals", "value": "on" }
                            },
                            {
                                "type": "pattern", "value": "^[0-9]+$", "message": "Digits only",
                                "condition": { "field": "mode", "operator": "equals", "value": "on" }
                            }
                        ]
                    }
                ]
            }"#,
        );

        // Only the first rule fails.
        let report = validator.validate(&json!({ "mode": "on", "extra": "12" }));
        assert_eq!(report.errors["extra"], "Too short");
        // Both fail: the later rule owns the path (no aggregation).
        let report = validator.validate(&json!({ "mode": "on", "extra": "abc" }));
        assert_eq!(report.errors["extra"], "Digits only");
    }

    #[test]
    fn test_validator_is_idempotent() {
        let validator = validator_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "name", "type": "text", "label": "Name",
                    "validations": [{ "type": "required", "message": "Required" }]
                }]
            }"#,
        );
        let snapshot = json!({ "name": "" });
        let first = validator.validate(&snapshot);
        let second = validator.validate(&snapshot);
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.valid, second.valid);
    }

    #[test]
    fn test_invalid_regex_fails_compilation() {
        let schema = parse_form_schema(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "x", "type": "text", "label": "X",
                    "validations": [{ "type": "pattern", "value": "([", "message": "Bad" }]
                }]
            }"#,
        )
        .unwrap();
        let err = build_validator(&schema.fields).unwrap_err();
        assert!(matches!(err, FormError::SchemaShape { .. }));
    }
}
