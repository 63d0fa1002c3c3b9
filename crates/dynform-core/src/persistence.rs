//! Best-effort draft persistence.
//!
//! Drafts are keyed by a deterministic content hash of the serialized schema,
//! so the same schema restores the same draft and an edited schema starts
//! fresh. The backing store is an injected [`KeyValueStore`] — no
//! process-wide singletons — and every store error is swallowed after a log
//! line: persistence never interrupts the form.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FormError;
use crate::schema::FormSchema;

const DRAFT_PREFIX: &str = "form-draft";

/// Injected namespace-scoped key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, FormError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), FormError>;
    fn remove(&mut self, key: &str) -> Result<(), FormError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn get(&self, key: &str) -> Result<Option<String>, FormError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), FormError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), FormError> {
        (**self).remove(key)
    }
}

/// In-memory store for tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    entries: std::collections::BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, FormError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), FormError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), FormError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Deterministic form identifier from schema content.
///
/// djb2-xor over the serialized schema, base-36. Same schema ⇒ same id;
/// collisions are acceptable at this probability — the id scopes drafts,
/// nothing more.
pub fn build_form_id(schema: &FormSchema) -> String {
    let serialized = serde_json::to_string(schema).unwrap_or_default();
    let mut hash: u32 = 5381;
    for byte in serialized.bytes() {
        hash = hash.wrapping_mul(33) ^ u32::from(byte);
    }
    format!("dynamic-form:{}", to_base36(hash))
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

/// Stored envelope: the draft plus the id it was written under, so a stale
/// entry under a reused key is rejected on load.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDraft {
    form_id: String,
    data: Value,
    timestamp: u64,
}

/// Draft persistence over an injected store.
pub struct DraftStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> DraftStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn draft_key(form_id: &str) -> String {
        format!("{DRAFT_PREFIX}:{form_id}")
    }

    /// Load the draft for a form id. Any store error, parse failure, or
    /// envelope mismatch yields `None`.
    pub fn load(&self, form_id: &str) -> Option<Value> {
        let raw = match self.store.get(&Self::draft_key(form_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%form_id, %err, "draft load failed");
                return None;
            }
        };
        let stored: StoredDraft = serde_json::from_str(&raw).ok()?;
        if stored.form_id != form_id || !stored.data.is_object() {
            return None;
        }
        Some(stored.data)
    }

    /// Persist a snapshot. Best effort: errors are logged and dropped.
    pub fn save(&mut self, form_id: &str, data: &Value) {
        let stored = StoredDraft {
            form_id: form_id.to_string(),
            data: data.clone(),
            timestamp: now_millis(),
        };
        let payload = match serde_json::to_string(&stored) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%form_id, %err, "draft serialization failed");
                return;
            }
        };
        if let Err(err) = self.store.set(&Self::draft_key(form_id), &payload) {
            warn!(%form_id, %err, "draft save failed");
        } else {
            debug!(%form_id, "draft saved");
        }
    }

    /// Remove the persisted draft. Best effort.
    pub fn clear(&mut self, form_id: &str) {
        if let Err(err) = self.store.remove(&Self::draft_key(form_id)) {
            warn!(%form_id, %err, "draft clear failed");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Explicit cancellable debounce handle.
///
/// Every schedule resets the deadline; the owner polls [`Debouncer::fire_due`]
/// on its event sequence and cancels on teardown or superseding calls.
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)arm the timer from `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// True exactly once per elapsed deadline.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
