//! Conditional visibility evaluation and transition tracking.
//!
//! [`should_show`] answers the point question; [`VisibilityTracker`] owns the
//! per-instance two-state machine. The tracker compiles the schema once,
//! recording every conditional node, the leaf paths underneath it, and the
//! distinct set of watched dependency paths. On each apply it recomputes the
//! visible-set, diffs against the previous one, and returns the paths whose
//! values must be unregistered — stale hidden values never reach the
//! validator or the submitted output. A hidden→visible transition restores
//! nothing: conditional fields are not remembered across toggles within a
//! session.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::path::{build_field_path_map, get_by_path, join_path, resolve_reference};
use crate::schema::{SchemaNode, ShowWhenCondition};

/// Evaluate one condition against a snapshot.
///
/// No condition means always visible. Otherwise the watched value must be
/// strictly equal to `equals` — a missing or not-yet-loaded value compares
/// unequal, hiding the node.
pub fn should_show(condition: Option<&ResolvedCondition>, snapshot: &Value) -> bool {
    match condition {
        None => true,
        Some(cond) => get_by_path(snapshot, &cond.path) == Some(&cond.equals),
    }
}

/// A `showWhen` condition with its field reference resolved to an absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCondition {
    pub path: String,
    pub equals: Value,
}

enum VisNode {
    Field {
        path: String,
        condition: Option<ResolvedCondition>,
    },
    Group {
        condition: Option<ResolvedCondition>,
        children: Vec<VisNode>,
    },
}

/// Tracks show/hide state for every conditional field and group.
pub struct VisibilityTracker {
    roots: Vec<VisNode>,
    watched: BTreeSet<String>,
    visible: BTreeSet<String>,
    initialized: bool,
}

impl VisibilityTracker {
    /// Compile the schema tree. Call [`VisibilityTracker::apply`] with the
    /// mount snapshot to seed the initial state.
    pub fn new(fields: &[SchemaNode]) -> Self {
        let id_to_path = build_field_path_map(fields);
        let mut watched = BTreeSet::new();
        let roots = compile(fields, "", &id_to_path, &mut watched);
        Self {
            roots,
            watched,
            visible: BTreeSet::new(),
            initialized: false,
        }
    }

    /// Distinct dependency paths read by any condition. Re-evaluation only
    /// needs to run when one of these changes.
    pub fn watched_paths(&self) -> impl Iterator<Item = &str> {
        self.watched.iter().map(String::as_str)
    }

    /// Whether the field at `path` is currently visible (ancestors included).
    pub fn is_visible(&self, path: &str) -> bool {
        self.visible.contains(path)
    }

    /// Currently visible leaf field paths.
    pub fn visible_paths(&self) -> impl Iterator<Item = &str> {
        self.visible.iter().map(String::as_str)
    }

    /// Recompute visibility from the snapshot and return the leaf paths that
    /// transitioned visible→hidden since the previous apply. The caller
    /// removes those values from the snapshot.
    pub fn apply(&mut self, snapshot: &Value) -> Vec<String> {
        let mut now_visible = BTreeSet::new();
        collect_visible(&self.roots, snapshot, true, &mut now_visible);

        let removed: Vec<String> = if self.initialized {
            self.visible.difference(&now_visible).cloned().collect()
        } else {
            // Mount: initial state is computed, nothing to unregister.
            Vec::new()
        };

        if !removed.is_empty() {
            debug!(count = removed.len(), "unregistering hidden field paths");
        }

        self.visible = now_visible;
        self.initialized = true;
        removed
    }
}

fn compile(
    items: &[SchemaNode],
    parent_path: &str,
    id_to_path: &std::collections::BTreeMap<String, String>,
    watched: &mut BTreeSet<String>,
) -> Vec<VisNode> {
    items
        .iter()
        .map(|item| {
            let item_path = join_path(parent_path, item.id());
            let condition = item.show_when().map(|cond| {
                let resolved = resolve_condition(cond, parent_path, id_to_path);
                watched.insert(resolved.path.clone());
                resolved
            });
            match item {
                SchemaNode::Field(_) => VisNode::Field {
                    path: item_path,
                    condition,
                },
                SchemaNode::Group(group) => VisNode::Group {
                    condition,
                    children: compile(&group.fields, &item_path, id_to_path, watched),
                },
            }
        })
        .collect()
}

fn resolve_condition(
    condition: &ShowWhenCondition,
    scope_path: &str,
    id_to_path: &std::collections::BTreeMap<String, String>,
) -> ResolvedCondition {
    ResolvedCondition {
        path: resolve_reference(&condition.field, scope_path, id_to_path),
        equals: condition.equals.clone(),
    }
}

/// Collect visible LEAF paths. A hidden group hides its whole subtree no
/// matter what the children's own conditions say.
fn collect_visible(
    nodes: &[VisNode],
    snapshot: &Value,
    parent_visible: bool,
    visible: &mut BTreeSet<String>,
) {
    for node in nodes {
        match node {
            VisNode::Field { path, condition } => {
                if parent_visible && should_show(condition.as_ref(), snapshot) {
                    visible.insert(path.clone());
                }
            }
            VisNode::Group { condition, children } => {
                let shown = parent_visible && should_show(condition.as_ref(), snapshot);
                collect_visible(children, snapshot, shown, visible);
            }
        }
    }
}
