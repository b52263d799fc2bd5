//! Blocking dependency edge.
//!
//! # Invariants
//! - `blocked != blocker`.
//! - Both endpoints live in the same `Scope`.
//! - Edges have set semantics: one `(blocked, blocker)` pair at most.

use super::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// "`blocked` cannot be resolved until `blocker` is resolved."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub blocked: TaskId,
    pub blocker: TaskId,
}

impl DependencyEdge {
    pub fn new(blocked: TaskId, blocker: TaskId) -> Self {
        Self { blocked, blocker }
    }

    /// Returns whether `task` is either endpoint.
    pub fn touches(&self, task: TaskId) -> bool {
        self.blocked == task || self.blocker == task
    }
}

impl Display for DependencyEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} blocked by {}", self.blocked, self.blocker)
    }
}
