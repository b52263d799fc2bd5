//! Project use-case service.
//!
//! # Responsibility
//! - Provide owner-scoped CRUD entry points for projects.
//! - Map repository failures to project-level errors.
//!
//! # Invariants
//! - Every read and write is constrained to the calling owner.
//! - Deleting a project removes its tasks and dependency edges atomically.

use crate::db::DbError;
use crate::model::project::{NewProject, OwnerId, Project, ProjectId, ProjectPatch};
use crate::model::ValidationError;
use crate::repo::project_repo::{ProjectDeletion, ProjectRepository};
use crate::repo::RepoError;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from project service operations.
#[derive(Debug)]
pub enum ProjectServiceError {
    Validation(ValidationError),
    /// Project does not exist or belongs to another owner.
    ProjectNotFound(ProjectId),
    Conflict(DbError),
    Repo(RepoError),
}

impl Display for ProjectServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::Conflict(err) => write!(f, "concurrent write conflict: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProjectServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::ProjectNotFound(_) => None,
        }
    }
}

impl From<RepoError> for ProjectServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            RepoError::Conflict(err) => Self::Conflict(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for ProjectServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

pub type ProjectServiceResult<T> = Result<T, ProjectServiceError>;

/// Use-case service wrapper for project operations.
pub struct ProjectService<R: ProjectRepository> {
    repo: R,
}

impl<R: ProjectRepository> ProjectService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a project owned by `owner_id`.
    pub fn create_project(
        &self,
        owner_id: OwnerId,
        request: &NewProject,
    ) -> ProjectServiceResult<Project> {
        let project = Project::new(owner_id, request);
        project.validate()?;
        self.repo.create_project(&project)?;
        info!(
            "event=project_create module=service status=ok project={}",
            project.scope()
        );
        Ok(project)
    }

    /// Loads one project of the owner.
    pub fn get_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> ProjectServiceResult<Project> {
        self.repo
            .get_project(owner_id, project_id)?
            .ok_or(ProjectServiceError::ProjectNotFound(project_id))
    }

    /// Lists the owner's projects, oldest first.
    pub fn list_projects(&self, owner_id: OwnerId) -> ProjectServiceResult<Vec<Project>> {
        self.repo.list_projects(owner_id).map_err(Into::into)
    }

    /// Applies `patch` and returns the stored project.
    pub fn update_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        patch: &ProjectPatch,
    ) -> ProjectServiceResult<Project> {
        let mut project = self.get_project(owner_id, project_id)?;
        project.apply_patch(patch);
        project.validate()?;
        self.repo.update_project(&project)?;
        info!(
            "event=project_update module=service status=ok project={}",
            project.scope()
        );
        self.get_project(owner_id, project_id)
    }

    /// Deletes a project with every task and dependency inside it.
    pub fn delete_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> ProjectServiceResult<ProjectDeletion> {
        match self.repo.delete_project(owner_id, project_id) {
            Ok(deletion) => {
                info!(
                    "event=project_delete module=service status=ok project={}/{} tasks_removed={} dependencies_removed={}",
                    owner_id, project_id, deletion.tasks_removed, deletion.dependencies_removed
                );
                Ok(deletion)
            }
            Err(err) => {
                let err = ProjectServiceError::from(err);
                if !matches!(err, ProjectServiceError::ProjectNotFound(_)) {
                    error!(
                        "event=project_delete module=service status=error project={}/{} error={}",
                        owner_id, project_id, err
                    );
                }
                Err(err)
            }
        }
    }
}
