//! The auto-fill request state machine.
//!
//! One unit runs per resolved config; units are fully independent and their
//! requests may be in flight concurrently. The engine is transport-agnostic:
//! [`AutoFillEngine::poll`] emits the requests that must fire for the current
//! snapshot, the caller performs the I/O, and
//! [`AutoFillEngine::complete`] merges the outcome back.
//!
//! Deduplication and staleness both hang off the request key — the canonical
//! serialization of the current dependency values. At most one request is in
//! flight per unit, a key equal to the last completed one is never re-issued,
//! and every issued request carries the unit's generation: if the
//! dependencies change again before completion the generation moves on and
//! the late result is discarded rather than written (cancellation by
//! relevance, not by abort).

use serde_json::{Map, Value};
use tracing::debug;

use crate::autofill::resolver::ResolvedAutoFillConfig;
use crate::error::FormError;
use crate::snapshot::{is_empty_value, SnapshotStore};
use crate::transport::ApiResponse;

/// A request the caller must perform against the transport.
#[derive(Debug, Clone)]
pub struct AutoFillRequest {
    /// Key of the declaring config.
    pub config_key: String,
    pub endpoint: String,
    /// Parameters, keyed by the declared dependency names.
    pub params: Map<String, Value>,
    /// Canonical serialization of `params` — the dedup/staleness token.
    pub request_key: String,
    generation: u64,
}

/// Completion of a previously issued request.
#[derive(Debug, Clone)]
pub enum AutoFillOutcome {
    Response(ApiResponse),
    /// Transport-level rejection; treated identically to `success: false`.
    Rejected(String),
}

struct AutoFillUnit {
    config: ResolvedAutoFillConfig,
    /// Bumped whenever the relevant key changes; completions carrying an
    /// older generation are stale.
    generation: u64,
    in_flight_key: Option<String>,
    last_completed_key: Option<String>,
    /// Whether the previous evaluation saw complete dependencies — target
    /// clearing only happens on a ready→not-ready regression.
    had_ready: bool,
    error: Option<FormError>,
}

/// Drives every auto-fill declaration of one mounted form.
pub struct AutoFillEngine {
    units: Vec<AutoFillUnit>,
}

impl AutoFillEngine {
    pub fn new(configs: Vec<ResolvedAutoFillConfig>) -> Self {
        let units = configs
            .into_iter()
            .map(|config| AutoFillUnit {
                config,
                generation: 0,
                in_flight_key: None,
                last_completed_key: None,
                had_ready: false,
                error: None,
            })
            .collect();
        Self { units }
    }

    /// Re-evaluate every unit against the snapshot, returning the requests
    /// that must fire. Clears targets on dependency regression.
    pub fn poll(&mut self, store: &mut SnapshotStore) -> Vec<AutoFillRequest> {
        let mut requests = Vec::new();
        for unit in &mut self.units {
            if let Some(request) = unit.evaluate(store) {
                requests.push(request);
            }
        }
        requests
    }

    /// Merge a completed request. A completion whose generation is stale is
    /// discarded without touching the snapshot.
    pub fn complete(
        &mut self,
        request: &AutoFillRequest,
        outcome: AutoFillOutcome,
        store: &mut SnapshotStore,
    ) {
        let Some(unit) = self
            .units
            .iter_mut()
            .find(|unit| unit.config.key == request.config_key)
        else {
            return;
        };

        if request.generation != unit.generation {
            debug!(
                config = %request.config_key,
                key = %request.request_key,
                "discarding stale auto-fill completion"
            );
            return;
        }

        match outcome {
            AutoFillOutcome::Response(response) if response.success => {
                let data = response.data.unwrap_or_default();
                for target in &unit.config.target_fields {
                    // Targets absent from the payload are left untouched.
                    if let Some(value) = data.get(&target.key) {
                        store.set(&target.path, value.clone());
                    }
                }
                unit.error = None;
            }
            AutoFillOutcome::Response(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Auto-fill request failed".to_string());
                unit.fail(message, store);
            }
            AutoFillOutcome::Rejected(message) => {
                unit.fail(message, store);
            }
        }

        unit.last_completed_key = Some(request.request_key.clone());
        unit.in_flight_key = None;
    }

    /// Loading is observable while a request for the current key is in flight.
    pub fn is_loading(&self, config_key: &str) -> bool {
        self.unit(config_key)
            .is_some_and(|unit| unit.in_flight_key.is_some())
    }

    /// The surfaced per-config error, if any.
    pub fn error(&self, config_key: &str) -> Option<&FormError> {
        self.unit(config_key).and_then(|unit| unit.error.as_ref())
    }

    /// Dismiss a surfaced error without retrying.
    pub fn dismiss_error(&mut self, config_key: &str) {
        if let Some(unit) = self.units.iter_mut().find(|u| u.config.key == config_key) {
            unit.error = None;
        }
    }

    fn unit(&self, config_key: &str) -> Option<&AutoFillUnit> {
        self.units.iter().find(|unit| unit.config.key == config_key)
    }
}

impl AutoFillUnit {
    fn evaluate(&mut self, store: &mut SnapshotStore) -> Option<AutoFillRequest> {
        let values: Vec<Option<Value>> = self
            .config
            .depends_on
            .iter()
            .map(|dep| store.get(&dep.path).cloned())
            .collect();

        // A dependency missing entirely (vs holding an empty value) means its
        // field is mid-unregistration from a visibility transition.
        let unregistered = values.iter().any(Option::is_none);
        let ready = !self.config.depends_on.is_empty()
            && values.iter().all(|value| !is_empty_value(value.as_ref()));

        if !ready {
            if self.had_ready && !unregistered {
                self.clear_targets(store);
            }
            if self.in_flight_key.take().is_some() {
                // Invalidate whatever is still in flight.
                self.generation += 1;
            }
            self.had_ready = false;
            return None;
        }
        self.had_ready = true;

        let mut params = Map::new();
        for (dep, value) in self.config.depends_on.iter().zip(values) {
            params.insert(dep.key.clone(), value.expect("ready implies present"));
        }
        let request_key = serde_json::to_string(&params).expect("param map serializes");

        if self.last_completed_key.as_deref() == Some(request_key.as_str())
            || self.in_flight_key.as_deref() == Some(request_key.as_str())
        {
            return None;
        }

        self.generation += 1;
        self.in_flight_key = Some(request_key.clone());
        debug!(config = %self.config.key, key = %request_key, "issuing auto-fill request");

        Some(AutoFillRequest {
            config_key: self.config.key.clone(),
            endpoint: self.config.api_endpoint.clone(),
            params,
            request_key,
            generation: self.generation,
        })
    }

    fn fail(&mut self, message: String, store: &mut SnapshotStore) {
        debug!(config = %self.config.key, %message, "auto-fill request failed");
        self.error = Some(FormError::AutoFill {
            config_key: self.config.key.clone(),
            message,
        });
        self.clear_targets(store);
    }

    fn clear_targets(&self, store: &mut SnapshotStore) {
        for target in &self.config.target_fields {
            store.set(&target.path, Value::String(String::new()));
        }
    }
}
