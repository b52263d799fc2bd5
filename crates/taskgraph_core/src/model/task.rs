//! Task domain model.
//!
//! # Responsibility
//! - Define the task record and its lifecycle status.
//! - Define create/patch request shapes consumed by the task service.
//!
//! # Invariants
//! - `task_id` is stable and never reused for another task.
//! - `project_id`/`owner_id` never change after creation.
//! - Status is opaque to dependency handling: a closed task still blocks
//!   until the edge is removed.

use super::project::{OwnerId, ProjectId, Scope};
use super::{
    next_update_stamp, now_epoch_ms, validate_id, validate_length, validate_name, ValidationError,
    MAX_DESCRIPTION_CHARS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, not started.
    #[default]
    Open,
    /// Work is in progress.
    InProgress,
    /// Finished or abandoned.
    Closed,
}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    /// Serialized as `user_id` to match the external schema naming.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Task {
    /// Creates a task with a generated id inside `scope`.
    ///
    /// Initial blockers in `request.blocked_by` are not part of the record;
    /// they become dependency edges persisted alongside it.
    pub fn new(scope: Scope, request: &NewTask) -> Self {
        let now = now_epoch_ms();
        Self {
            task_id: Uuid::new_v4(),
            project_id: scope.project_id,
            owner_id: scope.owner_id,
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            status: request.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scope pair this task is confined to.
    pub fn scope(&self) -> Scope {
        Scope::new(self.owner_id, self.project_id)
    }

    /// Returns whether this task lives in `scope`.
    pub fn is_in_scope(&self, scope: Scope) -> bool {
        self.scope() == scope
    }

    /// Checks identity and attribute bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("task.task_id", self.task_id)?;
        validate_id("task.project_id", self.project_id)?;
        validate_id("task.user_id", self.owner_id)?;
        validate_name("task.name", &self.name)?;
        validate_length("task.description", &self.description, MAX_DESCRIPTION_CHARS)
    }

    /// Applies set fields of `patch`, leaving the rest unchanged.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = next_update_stamp(self.updated_at);
    }
}

/// Request model for creating a task in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Existing tasks in the same scope that block the new one.
    #[serde(default)]
    pub blocked_by: Vec<TaskId>,
}

impl NewTask {
    /// Open task with the given name and no blockers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Open,
            blocked_by: Vec::new(),
        }
    }
}

/// Partial update for a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}
