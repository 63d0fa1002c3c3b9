//! Form session orchestration.
//!
//! [`FormSession`] composes the compiled validator, the visibility tracker,
//! the auto-fill engine, the snapshot store, and draft persistence for one
//! mounted form. All mutation flows through the session on a single logical
//! event sequence: input handling, validation, and visibility are
//! synchronous; the only suspension point is the auto-fill transport, driven
//! through [`FormSession::take_pending_requests`] /
//! [`FormSession::complete_request`].

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::autofill::{resolve_auto_fill_configs, AutoFillEngine, AutoFillOutcome, AutoFillRequest};
use crate::error::FormError;
use crate::path::join_path;
use crate::persistence::{build_form_id, Debouncer, DraftStore, KeyValueStore};
use crate::schema::{FormSchema, SchemaNode};
use crate::snapshot::{SnapshotStore, SubscriptionId};
use crate::validator::{build_validator, ValidationReport, Validator};
use crate::visibility::VisibilityTracker;

/// Reaction cascades (visibility pruning re-triggering auto-fill and back)
/// settle within a couple of rounds; the cap only guards against a schema
/// wiring auto-fill output into its own dependencies.
const MAX_REACT_ROUNDS: usize = 16;

/// Result of a submit attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The full nested record, groups as nested objects.
    Submitted(Value),
    /// Per-path error messages.
    Rejected(BTreeMap<String, String>),
}

/// One mounted form instance.
pub struct FormSession<S: KeyValueStore> {
    schema: FormSchema,
    form_id: String,
    validator: Validator,
    visibility: VisibilityTracker,
    autofill: AutoFillEngine,
    store: SnapshotStore,
    drafts: DraftStore<S>,
    draft_debounce: Debouncer,
    visibility_sub: SubscriptionId,
    autofill_sub: SubscriptionId,
    pending: Vec<AutoFillRequest>,
    errors: BTreeMap<String, String>,
    last_outcome: Option<SubmitOutcome>,
    restored_draft: bool,
}

impl<S: KeyValueStore> FormSession<S> {
    /// Mount a form: compile the schema, restore a draft (or apply default
    /// values), seed visibility, and evaluate initial auto-fill readiness.
    pub fn new(schema: FormSchema, store_backend: S) -> Result<Self, FormError> {
        let validator = build_validator(&schema.fields)?;
        let form_id = build_form_id(&schema);
        let drafts = DraftStore::new(store_backend);

        let (mut store, restored_draft) = match drafts.load(&form_id) {
            Some(draft) => {
                debug!(%form_id, "restoring draft");
                (SnapshotStore::from_value(draft), true)
            }
            None => {
                let mut store = SnapshotStore::new();
                apply_defaults(&schema.fields, "", &mut store);
                (store, false)
            }
        };
        // Mount-time writes are not edits.
        store.drain_triggered();

        let mut visibility = VisibilityTracker::new(&schema.fields);
        let configs = resolve_auto_fill_configs(&schema.fields);

        let watched: Vec<String> = visibility.watched_paths().map(String::from).collect();
        let visibility_sub = store.subscribe(&watched);
        let dependencies: Vec<String> = configs
            .iter()
            .flat_map(|config| config.depends_on.iter().map(|dep| dep.path.clone()))
            .collect();
        let autofill_sub = store.subscribe(&dependencies);

        let mut autofill = AutoFillEngine::new(configs);

        // Initial state: visibility from the mount snapshot, then whatever
        // auto-fill is already ready (a restored draft may satisfy deps).
        let snapshot = store.data().clone();
        visibility.apply(&snapshot);
        let pending = autofill.poll(&mut store);
        store.drain_triggered();

        Ok(Self {
            schema,
            form_id,
            validator,
            visibility,
            autofill,
            store,
            drafts,
            draft_debounce: Debouncer::new(Debouncer::DEFAULT_DELAY),
            visibility_sub,
            autofill_sub,
            pending,
            errors: BTreeMap::new(),
            last_outcome: None,
            restored_draft,
        })
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn restored_draft(&self) -> bool {
        self.restored_draft
    }

    /// Current nested data record.
    pub fn data(&self) -> &Value {
        self.store.data()
    }

    /// Errors from the most recent submit attempt.
    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn last_outcome(&self) -> Option<&SubmitOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn is_visible(&self, path: &str) -> bool {
        self.visibility.is_visible(path)
    }

    pub fn autofill_loading(&self, config_key: &str) -> bool {
        self.autofill.is_loading(config_key)
    }

    pub fn autofill_error(&self, config_key: &str) -> Option<&FormError> {
        self.autofill.error(config_key)
    }

    pub fn dismiss_autofill_error(&mut self, config_key: &str) {
        self.autofill.dismiss_error(config_key);
    }

    /// Apply one user edit. Any edit invalidates the displayed submission
    /// result and error map, then cascades through visibility and auto-fill.
    pub fn set_value(&mut self, path: &str, value: Value, now: Instant) {
        self.errors.clear();
        self.last_outcome = None;
        let before = self.store.version();
        self.store.set(path, value);
        self.react();
        if self.store.version() != before {
            self.draft_debounce.schedule(now);
        }
    }

    /// Requests the caller must run against the transport. Draining hands
    /// over responsibility; each request is later fed to
    /// [`FormSession::complete_request`].
    pub fn take_pending_requests(&mut self) -> Vec<AutoFillRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Feed a transport completion back. Stale completions are discarded by
    /// the engine; a completion that actually writes counts as a data change.
    pub fn complete_request(
        &mut self,
        request: &AutoFillRequest,
        outcome: AutoFillOutcome,
        now: Instant,
    ) {
        let before = self.store.version();
        self.autofill.complete(request, outcome, &mut self.store);
        if self.store.version() != before {
            self.errors.clear();
            self.last_outcome = None;
        }
        self.react();
        if self.store.version() != before {
            self.draft_debounce.schedule(now);
        }
    }

    /// Fire due timers (draft persistence).
    pub fn tick(&mut self, now: Instant) {
        if self.draft_debounce.fire_due(now) {
            let data = self.store.data().clone();
            self.drafts.save(&self.form_id, &data);
        }
    }

    /// Validate the current record. On success the full nested snapshot is
    /// the output artifact; on failure the error map is retained for display
    /// and no output is produced.
    pub fn submit(&mut self) -> SubmitOutcome {
        let report: ValidationReport = self.validator.validate(self.store.data());
        let outcome = if report.valid {
            self.errors.clear();
            SubmitOutcome::Submitted(self.store.data().clone())
        } else {
            self.errors = report.errors.clone();
            SubmitOutcome::Rejected(report.errors)
        };
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Drop the persisted draft without touching live values.
    pub fn clear_draft(&mut self) {
        self.draft_debounce.cancel();
        self.drafts.clear(&self.form_id);
    }

    /// Cancel pending timers. In-flight auto-fill completions arriving after
    /// teardown are simply never fed back.
    pub fn teardown(&mut self) {
        self.draft_debounce.cancel();
    }

    /// Settle the reaction cascade: visibility pruning and auto-fill
    /// re-evaluation, repeated until no watched path changes remain.
    fn react(&mut self) {
        for _ in 0..MAX_REACT_ROUNDS {
            let triggered = self.store.drain_triggered();
            if triggered.is_empty() {
                break;
            }

            if triggered.contains(&self.visibility_sub) {
                let snapshot = self.store.data().clone();
                for removed in self.visibility.apply(&snapshot) {
                    self.store.remove(&removed);
                }
            }
            if triggered.contains(&self.autofill_sub) {
                let requests = self.autofill.poll(&mut self.store);
                self.pending.extend(requests);
            }
        }
        if !self.store.drain_triggered().is_empty() {
            warn!("reaction cascade did not settle; check auto-fill wiring for cycles");
        }
    }
}

fn apply_defaults(fields: &[SchemaNode], parent_path: &str, store: &mut SnapshotStore) {
    for item in fields {
        let item_path = join_path(parent_path, item.id());
        match item {
            SchemaNode::Field(field) => {
                if let Some(default) = &field.default_value {
                    store.set(&item_path, default.clone());
                }
            }
            SchemaNode::Group(group) => apply_defaults(&group.fields, &item_path, store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_form_schema;
    use crate::persistence::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn session_for(schema_json: &str) -> FormSession<MemoryStore> {
        let schema = parse_form_schema(schema_json).unwrap();
        FormSession::new(schema, MemoryStore::new()).unwrap()
    }

    #[test]
    fn test_defaults_apply_without_draft() {
        let session = session_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "country", "type": "text", "label": "Country",
                    "defaultValue": "Bulgaria"
                }]
            }"#,
        );
        assert_eq!(session.data()["country"], json!("Bulgaria"));
        assert!(!session.restored_draft());
    }

    #[test]
    fn test_edit_invalidates_displayed_result() {
        let mut session = session_for(
            r#"{
                "title": "T",
                "fields": [{
                    "id": "name", "type": "text", "label": "Name",
                    "validations": [{ "type": "required", "message": "Name is required" }]
                }]
            }"#,
        );
        let now = Instant::now();

        let outcome = session.submit();
        assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
        assert_eq!(session.errors()["name"], "Name is required");

        session.set_value("name", json!("John"), now);
        assert!(session.errors().is_empty());
        assert!(session.last_outcome().is_none());

        let outcome = session.submit();
        match outcome {
            SubmitOutcome::Submitted(output) => assert_eq!(output, json!({ "name": "John" })),
            SubmitOutcome::Rejected(errors) => panic!("unexpected rejection: {errors:?}"),
        }
    }

    #[test]
    fn test_hidden_field_pruned_from_output() {
        let mut session = session_for(
            r#"{
                "title": "T",
                "fields": [
                    { "id": "mode", "type": "text", "label": "Mode" },
                    {
                        "id": "detail", "type": "text", "label": "Detail",
                        "showWhen": { "field": "mode", "equals": "advanced" }
                    }
                ]
            }"#,
        );
        let now = Instant::now();

        session.set_value("mode", json!("advanced"), now);
        session.set_value("detail", json!("secret"), now);
        assert!(session.is_visible("detail"));

        // Toggling the condition unregisters the hidden value.
        session.set_value("mode", json!("simple"), now);
        assert!(!session.is_visible("detail"));
        assert_eq!(session.data().get("detail"), None);

        match session.submit() {
            SubmitOutcome::Submitted(output) => {
                assert_eq!(output, json!({ "mode": "simple" }));
            }
            SubmitOutcome::Rejected(errors) => panic!("unexpected rejection: {errors:?}"),
        }

        // Re-showing does not restore the old value.
        session.set_value("mode", json!("advanced"), now);
        assert_eq!(session.data().get("detail"), None);
    }

    #[test]
    fn test_draft_saved_after_debounce_and_restored() {
        let schema_json = r#"{
            "title": "T",
            "fields": [{ "id": "name", "type": "text", "label": "Name" }]
        }"#;
        let schema = parse_form_schema(schema_json).unwrap();

        let mut backend = MemoryStore::new();
        {
            let mut session = FormSession::new(schema.clone(), &mut backend).unwrap();
            let start = Instant::now();
            session.set_value("name", json!("Bob"), start);

            // Before the debounce elapses nothing is persisted.
            session.tick(start + Duration::from_millis(100));
            session.tick(start + Debouncer::DEFAULT_DELAY);
        }

        let session = FormSession::new(schema, &mut backend).unwrap();
        assert!(session.restored_draft());
        assert_eq!(session.data()["name"], json!("Bob"));
    }

    #[test]
    fn test_restored_draft_with_ready_deps_fires_autofill() {
        let schema_json = r#"{
            "title": "T",
            "fields": [
                {
                    "id": "zipCode", "type": "text", "label": "Zip",
                    "autoFill": {
                        "apiEndpoint": "/api/address",
                        "dependsOn": ["zipCode"],
                        "targetFields": ["city"]
                    }
                },
                { "id": "city", "type": "text", "label": "City" }
            ]
        }"#;
        let schema = parse_form_schema(schema_json).unwrap();

        let mut backend = MemoryStore::new();
        {
            let mut drafts = DraftStore::new(&mut backend);
            drafts.save(&build_form_id(&schema), &json!({ "zipCode": "1000" }));
        }

        let mut session = FormSession::new(schema, backend).unwrap();
        let pending = session.take_pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_key, r#"{"zipCode":"1000"}"#);
    }
}
