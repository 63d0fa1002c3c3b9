//! Schema model for declarative form definitions.
//!
//! Mirrors the JSON wire format authors write: fields, nested groups,
//! validation rules, conditional visibility, and auto-fill declarations.
//! [`crate::parser::parse_form_schema`] is the only supported entry point —
//! it structurally validates raw JSON before these types are constructed,
//! so invariants (unique ids, options on select/radio) hold by the time a
//! [`FormSchema`] exists.

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Supported form field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Textarea,
    Select,
    Checkbox,
    Radio,
    TextWithValidation,
}

impl FieldType {
    /// Wire names, in the order they are reported in schema errors.
    pub const WIRE_NAMES: [&'static str; 6] = [
        "text",
        "textarea",
        "select",
        "checkbox",
        "radio",
        "text-with-validation",
    ];
}

/// Available validation rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationType {
    Required,
    Pattern,
    MinLength,
    MaxLength,
    Custom,
}

/// Rule payload — a regex source for `pattern`/`custom`, a length bound for
/// `minLength`/`maxLength`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Text(String),
    Number(serde_json::Number),
}

impl RuleValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuleValue::Text(s) => Some(s),
            RuleValue::Number(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            RuleValue::Text(_) => None,
            RuleValue::Number(n) => n.as_u64().map(|v| v as usize),
        }
    }
}

/// Condition gating a validation rule on another field's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Field reference — bare id or dotted path.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
}

/// A single validation constraint with its error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub rule_type: ValidationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RuleValue>,
    pub message: String,
    /// When present, the rule only applies while the condition holds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<RuleCondition>,
}

/// Simple conditional visibility: show while the referenced field equals a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowWhenCondition {
    /// Field reference — bare id or dotted path.
    pub field: String,
    /// Value that triggers visibility. Compared strictly (missing ≠ anything).
    pub equals: Value,
}

/// Auto-fill declaration: when every `depends_on` field holds a value, call
/// the endpoint and write the response into `target_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFillConfig {
    pub api_endpoint: String,
    pub depends_on: Vec<String>,
    pub target_fields: Vec<String>,
}

/// Option for `select` and `radio` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

/// A single input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Unique across the entire schema, groups included.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Initial value applied at mount when no draft is restored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations: Option<Vec<ValidationRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_fill: Option<AutoFillConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_when: Option<ShowWhenCondition>,
}

/// A group of related fields; groups nest arbitrarily (tree by construction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_when: Option<ShowWhenCondition>,
}

/// A node in the schema tree — either a leaf field or a group of nodes.
///
/// Discriminated on the wire by `"type": "group"`.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Field(FieldConfig),
    Group(GroupConfig),
}

impl SchemaNode {
    pub fn id(&self) -> &str {
        match self {
            SchemaNode::Field(f) => &f.id,
            SchemaNode::Group(g) => &g.id,
        }
    }

    pub fn show_when(&self) -> Option<&ShowWhenCondition> {
        match self {
            SchemaNode::Field(f) => f.show_when.as_ref(),
            SchemaNode::Group(g) => g.show_when.as_ref(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, SchemaNode::Group(_))
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let is_group = value.get("type").and_then(Value::as_str) == Some("group");
        if is_group {
            GroupConfig::deserialize(value)
                .map(SchemaNode::Group)
                .map_err(D::Error::custom)
        } else {
            FieldConfig::deserialize(value)
                .map(SchemaNode::Field)
                .map_err(D::Error::custom)
        }
    }
}

impl Serialize for SchemaNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            SchemaNode::Field(f) => f.serialize(serializer),
            SchemaNode::Group(g) => {
                // Re-inject the "type": "group" discriminator.
                let inner = serde_json::to_value(g).map_err(serde::ser::Error::custom)?;
                let obj = inner.as_object().expect("group serializes to object");
                let mut map = serializer.serialize_map(Some(obj.len() + 1))?;
                map.serialize_entry("id", &g.id)?;
                map.serialize_entry("type", "group")?;
                for (k, v) in obj {
                    if k != "id" {
                        map.serialize_entry(k, v)?;
                    }
                }
                map.end()
            }
        }
    }
}

/// Root form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<SchemaNode>,
}
