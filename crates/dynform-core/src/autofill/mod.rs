//! Auto-fill: declaration resolution and the request state machine.
//!
//! `resolver` turns schema `autoFill` declarations into absolute-path
//! configs; `engine` watches dependency values, issues deduplicated requests,
//! and merges results back into the snapshot without letting stale
//! completions write.

pub mod engine;
pub mod resolver;

pub use engine::{AutoFillEngine, AutoFillOutcome, AutoFillRequest};
pub use resolver::{resolve_auto_fill_configs, ResolvedAutoFillConfig, ResolvedFieldRef};
