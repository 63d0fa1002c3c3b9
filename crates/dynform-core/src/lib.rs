//! Compile declarative JSON form schemas into runnable validation models,
//! with conditional visibility and API-driven auto-fill.
//!
//! The pipeline: raw JSON text → [`parser::parse_form_schema`] (structural
//! gate) → [`validator::build_validator`] plus
//! [`autofill::resolve_auto_fill_configs`] → a [`FormSession`] that owns the
//! live data record and drives visibility, auto-fill, and draft persistence
//! for one mounted form.
//!
//! ```
//! use dynform_core::{parse_form_schema, FormSession, MemoryStore, SubmitOutcome};
//! use std::time::Instant;
//!
//! let schema = parse_form_schema(r#"{
//!     "title": "Contact",
//!     "fields": [{
//!         "id": "name", "type": "text", "label": "Name",
//!         "validations": [{ "type": "required", "message": "Name is required" }]
//!     }]
//! }"#).unwrap();
//!
//! let mut session = FormSession::new(schema, MemoryStore::new()).unwrap();
//! session.set_value("name", "John".into(), Instant::now());
//! assert!(matches!(session.submit(), SubmitOutcome::Submitted(_)));
//! ```

pub mod autofill;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod path;
pub mod persistence;
pub mod schema;
pub mod snapshot;
pub mod transport;
pub mod validator;
pub mod visibility;

pub use autofill::{
    resolve_auto_fill_configs, AutoFillEngine, AutoFillOutcome, AutoFillRequest,
    ResolvedAutoFillConfig, ResolvedFieldRef,
};
pub use error::FormError;
pub use orchestrator::{FormSession, SubmitOutcome};
pub use parser::{is_valid_json, parse_form_schema};
pub use path::{build_field_path_map, resolve_reference};
pub use persistence::{build_form_id, Debouncer, DraftStore, KeyValueStore, MemoryStore};
pub use schema::{
    AutoFillConfig, FieldConfig, FieldOption, FieldType, FormSchema, GroupConfig, RuleCondition,
    SchemaNode, ShowWhenCondition, ValidationRule, ValidationType,
};
pub use snapshot::{SnapshotStore, SubscriptionId};
pub use transport::{ApiResponse, AutoFillTransport, MockTransport};
pub use validator::{build_validator, ValidationReport, Validator};
pub use visibility::{should_show, VisibilityTracker};
