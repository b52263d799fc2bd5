//! Project repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide owner-scoped CRUD APIs over `projects`.
//! - Delete a project together with its tasks and dependency edges.
//!
//! # Invariants
//! - A project is only visible to its owner.
//! - Project deletion removes edges, then tasks, then the project row inside
//!   one IMMEDIATE transaction.

use super::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use crate::model::project::{OwnerId, Project, ProjectId};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const PROJECT_SELECT_SQL: &str = "SELECT
    project_uuid,
    owner_uuid,
    name,
    description,
    created_at,
    updated_at
FROM projects";

const PROJECT_COLUMNS: &[&str] = &[
    "project_uuid",
    "owner_uuid",
    "name",
    "description",
    "created_at",
    "updated_at",
];

/// Row counts removed by a project deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectDeletion {
    pub tasks_removed: usize,
    pub dependencies_removed: usize,
}

/// Repository interface for project operations.
pub trait ProjectRepository {
    /// Persists a new project.
    fn create_project(&self, project: &Project) -> RepoResult<ProjectId>;
    /// Loads one project owned by `owner_id`.
    fn get_project(&self, owner_id: OwnerId, project_id: ProjectId)
        -> RepoResult<Option<Project>>;
    /// Lists all projects of one owner, oldest first.
    fn list_projects(&self, owner_id: OwnerId) -> RepoResult<Vec<Project>>;
    /// Replaces name/description of an existing project.
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    /// Deletes a project with all of its tasks and dependency edges.
    fn delete_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> RepoResult<ProjectDeletion>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[("projects", PROJECT_COLUMNS)])?;
        Ok(Self { conn })
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, project: &Project) -> RepoResult<ProjectId> {
        project.validate()?;

        self.conn.execute(
            "INSERT INTO projects (
                project_uuid,
                owner_uuid,
                name,
                description,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                project.project_id.to_string(),
                project.owner_id.to_string(),
                project.name.as_str(),
                project.description.as_str(),
                project.created_at,
                project.updated_at,
            ],
        )?;

        Ok(project.project_id)
    }

    fn get_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> RepoResult<Option<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL}
             WHERE project_uuid = ?1
               AND owner_uuid = ?2;"
        ))?;

        let mut rows = stmt.query(params![project_id.to_string(), owner_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }

        Ok(None)
    }

    fn list_projects(&self, owner_id: OwnerId) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_SELECT_SQL}
             WHERE owner_uuid = ?1
             ORDER BY created_at ASC, project_uuid ASC;"
        ))?;

        let mut rows = stmt.query([owner_id.to_string()])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }

        Ok(projects)
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;

        let changed = self.conn.execute(
            "UPDATE projects
             SET
                name = ?3,
                description = ?4,
                updated_at = ?5
             WHERE project_uuid = ?1
               AND owner_uuid = ?2;",
            params![
                project.project_id.to_string(),
                project.owner_id.to_string(),
                project.name.as_str(),
                project.description.as_str(),
                project.updated_at,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::ProjectNotFound(project.project_id));
        }

        Ok(())
    }

    fn delete_project(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> RepoResult<ProjectDeletion> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let owner = owner_id.to_string();
        let project = project_id.to_string();

        let exists: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM projects
                WHERE project_uuid = ?1
                  AND owner_uuid = ?2
            );",
            params![project, owner],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::ProjectNotFound(project_id));
        }

        let dependencies_removed = tx.execute(
            "DELETE FROM task_dependencies
             WHERE project_uuid = ?1
               AND owner_uuid = ?2;",
            params![project, owner],
        )?;
        let tasks_removed = tx.execute(
            "DELETE FROM tasks
             WHERE project_uuid = ?1
               AND owner_uuid = ?2;",
            params![project, owner],
        )?;
        tx.execute(
            "DELETE FROM projects
             WHERE project_uuid = ?1
               AND owner_uuid = ?2;",
            params![project, owner],
        )?;

        tx.commit()?;
        Ok(ProjectDeletion {
            tasks_removed,
            dependencies_removed,
        })
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let project_uuid: String = row.get("project_uuid")?;
    let owner_uuid: String = row.get("owner_uuid")?;

    let project = Project {
        project_id: parse_uuid(&project_uuid, "projects.project_uuid")?,
        owner_id: parse_uuid(&owner_uuid, "projects.owner_uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    project.validate()?;
    Ok(project)
}
