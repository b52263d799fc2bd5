//! Project domain model.
//!
//! # Responsibility
//! - Define the project record that scopes tasks and dependencies.
//! - Define owner identity and the `(owner, project)` scope pair.
//!
//! # Invariants
//! - A project belongs to exactly one owner for its whole lifetime.
//! - Tasks and dependency edges never cross a project boundary.

use super::{
    next_update_stamp, now_epoch_ms, validate_id, validate_length, validate_name, ValidationError,
    MAX_DESCRIPTION_CHARS,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable project identifier.
pub type ProjectId = Uuid;

/// Identifier of the user owning projects and tasks.
///
/// Supplied by the caller; this crate does not authenticate it.
pub type OwnerId = Uuid;

/// The `(owner, project)` pair confining tasks and dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub project_id: ProjectId,
}

impl Scope {
    pub fn new(owner_id: OwnerId, project_id: ProjectId) -> Self {
        Self {
            owner_id,
            project_id,
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.project_id)
    }
}

/// Persisted project record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    /// Serialized as `user_id` to match the external schema naming.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Project {
    /// Creates a project with a generated id owned by `owner_id`.
    pub fn new(owner_id: OwnerId, request: &NewProject) -> Self {
        let now = now_epoch_ms();
        Self {
            project_id: Uuid::new_v4(),
            owner_id,
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Scope pair for tasks living in this project.
    pub fn scope(&self) -> Scope {
        Scope::new(self.owner_id, self.project_id)
    }

    /// Checks identity and attribute bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("project.project_id", self.project_id)?;
        validate_id("project.user_id", self.owner_id)?;
        validate_name("project.name", &self.name)?;
        validate_length(
            "project.description",
            &self.description,
            MAX_DESCRIPTION_CHARS,
        )
    }

    /// Applies set fields of `patch`, leaving the rest unchanged.
    pub fn apply_patch(&mut self, patch: &ProjectPatch) {
        if let Some(name) = &patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        self.updated_at = next_update_stamp(self.updated_at);
    }
}

/// Request model for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update for a project. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
