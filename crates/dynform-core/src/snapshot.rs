//! Live form data record with path-scoped change subscriptions.
//!
//! The store replaces implicit reactive-framework dependency tracking with an
//! explicit registry: observers subscribe to the distinct paths they read,
//! mutations mark only the subscriptions watching an overlapping path, and
//! the orchestrator drains the pending set on its single event sequence.
//! Unrelated keystrokes never reach an observer — a performance contract,
//! not an implementation detail.

use std::collections::{BTreeSet, HashSet};

use serde_json::{Map, Value};

use crate::path::{get_by_path, remove_by_path, set_by_path};

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    paths: HashSet<String>,
}

/// The mutable data record for one mounted form.
pub struct SnapshotStore {
    data: Value,
    subscriptions: Vec<Subscription>,
    next_id: u64,
    triggered: BTreeSet<SubscriptionId>,
    version: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Seed the store from an existing record (a restored draft).
    pub fn from_value(data: Value) -> Self {
        let data = if data.is_object() {
            data
        } else {
            Value::Object(Map::new())
        };
        Self {
            data,
            subscriptions: Vec::new(),
            next_id: 0,
            triggered: BTreeSet::new(),
            version: 0,
        }
    }

    /// Current nested record.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Monotonic mutation counter; bumps only on writes that change data.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_by_path(&self.data, path)
    }

    /// Register an observer for the given paths. Watching a path covers the
    /// whole subtree under it.
    pub fn subscribe(&mut self, paths: &[String]) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            paths: paths.iter().cloned().collect(),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.retain(|sub| sub.id != id);
        self.triggered.remove(&id);
    }

    /// Write a value. A write that leaves the value unchanged marks nothing.
    pub fn set(&mut self, path: &str, value: Value) {
        if self.get(path) == Some(&value) {
            return;
        }
        set_by_path(&mut self.data, path, value);
        self.mark_changed(path);
    }

    /// Remove a value (field unregistration on a visible→hidden transition).
    pub fn remove(&mut self, path: &str) {
        if remove_by_path(&mut self.data, path).is_some() {
            self.mark_changed(path);
        }
    }

    /// Hand pending notifications to the caller, clearing the set.
    pub fn drain_triggered(&mut self) -> Vec<SubscriptionId> {
        std::mem::take(&mut self.triggered).into_iter().collect()
    }

    fn mark_changed(&mut self, path: &str) {
        self.version += 1;
        for sub in &self.subscriptions {
            if sub.paths.iter().any(|watched| paths_overlap(watched, path)) {
                self.triggered.insert(sub.id);
            }
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a change at one path is visible to a watcher of the other:
/// equal paths, or one is a dot-prefix of the other (subtree writes notify
/// leaf watchers and leaf writes notify subtree watchers).
fn paths_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    long.starts_with(short) && long.as_bytes()[short.len()] == b'.'
}

/// Shared "holds a value" predicate: empty strings, empty arrays, and null
/// all count as absent. Used by auto-fill readiness checks.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
