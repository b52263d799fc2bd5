//! Task/dependency repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide scope-constrained reads over `tasks` and `task_dependencies`.
//! - Run task/edge mutations inside one write-locked scope transaction.
//!
//! # Invariants
//! - `in_scope_transaction` takes the SQLite write lock (`BEGIN IMMEDIATE`)
//!   before `work` reads anything, so reads and the following writes form a
//!   single serializable unit.
//! - A transaction whose `work` fails is rolled back; nothing persists.
//! - Edges are only inserted between tasks of the transaction's scope.

use super::{
    ensure_connection_ready, parse_task_status, parse_uuid, task_status_to_db, RepoError,
    RepoResult,
};
use crate::model::dependency::DependencyEdge;
use crate::model::project::Scope;
use crate::model::task::{Task, TaskId};
use log::debug;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const TASK_SELECT_SQL: &str = "SELECT
    t.task_uuid AS task_uuid,
    t.project_uuid AS project_uuid,
    t.owner_uuid AS owner_uuid,
    t.name AS name,
    t.description AS description,
    t.status AS status,
    t.created_at AS created_at,
    t.updated_at AS updated_at
FROM tasks t";

const TASK_COLUMNS: &[&str] = &[
    "task_uuid",
    "project_uuid",
    "owner_uuid",
    "name",
    "description",
    "status",
    "created_at",
    "updated_at",
];

const DEPENDENCY_COLUMNS: &[&str] = &["blocked_uuid", "blocker_uuid", "owner_uuid", "project_uuid"];

/// Task and edge mutations persisted together by one scope transaction.
///
/// Applied in this order: removed edges, deleted tasks, created tasks,
/// updated tasks, added edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub created_tasks: Vec<Task>,
    pub updated_tasks: Vec<Task>,
    pub deleted_tasks: Vec<TaskId>,
    pub added_edges: Vec<DependencyEdge>,
    pub removed_edges: Vec<DependencyEdge>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_task(mut self, task: Task) -> Self {
        self.created_tasks.push(task);
        self
    }

    pub fn update_task(mut self, task: Task) -> Self {
        self.updated_tasks.push(task);
        self
    }

    pub fn delete_task(mut self, task_id: TaskId) -> Self {
        self.deleted_tasks.push(task_id);
        self
    }

    pub fn add_edge(mut self, edge: DependencyEdge) -> Self {
        self.added_edges.push(edge);
        self
    }

    pub fn remove_edges(mut self, edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        self.removed_edges.extend(edges);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.created_tasks.is_empty()
            && self.updated_tasks.is_empty()
            && self.deleted_tasks.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Reads and writes available inside one scope transaction.
pub trait ScopeTransaction {
    /// Scope this transaction is locked to.
    fn scope(&self) -> Scope;
    /// Loads one task of this scope.
    fn load_task(&self, task_id: TaskId) -> RepoResult<Option<Task>>;
    /// Loads every dependency edge of this scope.
    fn load_edges(&self) -> RepoResult<Vec<DependencyEdge>>;
    /// Applies `changes`; commit happens when the enclosing work returns `Ok`.
    fn persist(&self, changes: &ChangeSet) -> RepoResult<()>;
}

/// Repository interface for tasks and their dependency edges.
pub trait TaskRepository {
    /// Returns whether the project exists and belongs to the scope owner.
    fn scope_exists(&self, scope: Scope) -> RepoResult<bool>;
    /// Loads one task of `scope`.
    fn get_task(&self, scope: Scope, task_id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists tasks of `scope`, oldest first.
    fn list_tasks(&self, scope: Scope) -> RepoResult<Vec<Task>>;
    /// Lists the tasks `task_id` is directly blocked by.
    fn list_blockers(&self, scope: Scope, task_id: TaskId) -> RepoResult<Vec<Task>>;
    /// Lists the tasks directly blocked by `task_id`.
    fn list_dependents(&self, scope: Scope, task_id: TaskId) -> RepoResult<Vec<Task>>;
    /// Loads every dependency edge of `scope`.
    fn load_edges(&self, scope: Scope) -> RepoResult<Vec<DependencyEdge>>;
    /// Runs `work` atomically under the database write lock.
    ///
    /// Fails with `ProjectNotFound` before calling `work` when the scope is
    /// invalid, and with `Conflict` when the lock cannot be acquired.
    fn in_scope_transaction<T, E, F>(&self, scope: Scope, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&dyn ScopeTransaction) -> Result<T, E>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                ("tasks", TASK_COLUMNS),
                ("task_dependencies", DEPENDENCY_COLUMNS),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn scope_exists(&self, scope: Scope) -> RepoResult<bool> {
        scope_exists(self.conn, scope)
    }

    fn get_task(&self, scope: Scope, task_id: TaskId) -> RepoResult<Option<Task>> {
        load_task(self.conn, scope, task_id)
    }

    fn list_tasks(&self, scope: Scope) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE t.owner_uuid = ?1
               AND t.project_uuid = ?2
             ORDER BY t.created_at ASC, t.task_uuid ASC;"
        ))?;
        let rows = stmt.query(params![
            scope.owner_id.to_string(),
            scope.project_id.to_string()
        ])?;
        collect_tasks(rows)
    }

    fn list_blockers(&self, scope: Scope, task_id: TaskId) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             INNER JOIN task_dependencies d ON d.blocker_uuid = t.task_uuid
             WHERE d.blocked_uuid = ?1
               AND d.owner_uuid = ?2
               AND d.project_uuid = ?3
             ORDER BY t.created_at ASC, t.task_uuid ASC;"
        ))?;
        let rows = stmt.query(params![
            task_id.to_string(),
            scope.owner_id.to_string(),
            scope.project_id.to_string()
        ])?;
        collect_tasks(rows)
    }

    fn list_dependents(&self, scope: Scope, task_id: TaskId) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             INNER JOIN task_dependencies d ON d.blocked_uuid = t.task_uuid
             WHERE d.blocker_uuid = ?1
               AND d.owner_uuid = ?2
               AND d.project_uuid = ?3
             ORDER BY t.created_at ASC, t.task_uuid ASC;"
        ))?;
        let rows = stmt.query(params![
            task_id.to_string(),
            scope.owner_id.to_string(),
            scope.project_id.to_string()
        ])?;
        collect_tasks(rows)
    }

    fn load_edges(&self, scope: Scope) -> RepoResult<Vec<DependencyEdge>> {
        load_edges(self.conn, scope)
    }

    fn in_scope_transaction<T, E, F>(&self, scope: Scope, work: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&dyn ScopeTransaction) -> Result<T, E>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        if !scope_exists(&tx, scope)? {
            return Err(RepoError::ProjectNotFound(scope.project_id).into());
        }

        let unit = SqliteScopeTransaction { conn: &tx, scope };
        let value = work(&unit)?;

        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

struct SqliteScopeTransaction<'tx> {
    conn: &'tx Connection,
    scope: Scope,
}

impl ScopeTransaction for SqliteScopeTransaction<'_> {
    fn scope(&self) -> Scope {
        self.scope
    }

    fn load_task(&self, task_id: TaskId) -> RepoResult<Option<Task>> {
        load_task(self.conn, self.scope, task_id)
    }

    fn load_edges(&self) -> RepoResult<Vec<DependencyEdge>> {
        load_edges(self.conn, self.scope)
    }

    fn persist(&self, changes: &ChangeSet) -> RepoResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let owner = self.scope.owner_id.to_string();
        let project = self.scope.project_id.to_string();

        for edge in &changes.removed_edges {
            self.conn.execute(
                "DELETE FROM task_dependencies
                 WHERE blocked_uuid = ?1
                   AND blocker_uuid = ?2
                   AND owner_uuid = ?3
                   AND project_uuid = ?4;",
                params![
                    edge.blocked.to_string(),
                    edge.blocker.to_string(),
                    owner,
                    project
                ],
            )?;
        }

        for task_id in &changes.deleted_tasks {
            let changed = self.conn.execute(
                "DELETE FROM tasks
                 WHERE task_uuid = ?1
                   AND owner_uuid = ?2
                   AND project_uuid = ?3;",
                params![task_id.to_string(), owner, project],
            )?;
            if changed == 0 {
                return Err(RepoError::TaskNotFound(*task_id));
            }
        }

        for task in &changes.created_tasks {
            self.ensure_in_scope(task)?;
            self.conn.execute(
                "INSERT INTO tasks (
                    task_uuid,
                    project_uuid,
                    owner_uuid,
                    name,
                    description,
                    status,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    task.task_id.to_string(),
                    project,
                    owner,
                    task.name.as_str(),
                    task.description.as_str(),
                    task_status_to_db(task.status),
                    task.created_at,
                    task.updated_at,
                ],
            )?;
        }

        for task in &changes.updated_tasks {
            self.ensure_in_scope(task)?;
            let changed = self.conn.execute(
                "UPDATE tasks
                 SET
                    name = ?4,
                    description = ?5,
                    status = ?6,
                    updated_at = ?7
                 WHERE task_uuid = ?1
                   AND owner_uuid = ?2
                   AND project_uuid = ?3;",
                params![
                    task.task_id.to_string(),
                    owner,
                    project,
                    task.name.as_str(),
                    task.description.as_str(),
                    task_status_to_db(task.status),
                    task.updated_at,
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::TaskNotFound(task.task_id));
            }
        }

        for edge in &changes.added_edges {
            for endpoint in [edge.blocked, edge.blocker] {
                if !task_in_scope(self.conn, self.scope, endpoint)? {
                    return Err(RepoError::TaskNotFound(endpoint));
                }
            }
            self.conn.execute(
                "INSERT INTO task_dependencies (
                    blocked_uuid,
                    blocker_uuid,
                    owner_uuid,
                    project_uuid
                ) VALUES (?1, ?2, ?3, ?4);",
                params![
                    edge.blocked.to_string(),
                    edge.blocker.to_string(),
                    owner,
                    project
                ],
            )?;
        }

        debug!(
            "event=scope_persist module=repo status=ok scope={} tasks_created={} tasks_updated={} tasks_deleted={} edges_added={} edges_removed={}",
            self.scope,
            changes.created_tasks.len(),
            changes.updated_tasks.len(),
            changes.deleted_tasks.len(),
            changes.added_edges.len(),
            changes.removed_edges.len()
        );
        Ok(())
    }
}

impl SqliteScopeTransaction<'_> {
    fn ensure_in_scope(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;
        if !task.is_in_scope(self.scope) {
            return Err(RepoError::InvalidData(format!(
                "task {} belongs to scope {}, not {}",
                task.task_id,
                task.scope(),
                self.scope
            )));
        }
        Ok(())
    }
}

fn scope_exists(conn: &Connection, scope: Scope) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM projects
            WHERE project_uuid = ?1
              AND owner_uuid = ?2
        );",
        params![scope.project_id.to_string(), scope.owner_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn task_in_scope(conn: &Connection, scope: Scope, task_id: TaskId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM tasks
            WHERE task_uuid = ?1
              AND owner_uuid = ?2
              AND project_uuid = ?3
        );",
        params![
            task_id.to_string(),
            scope.owner_id.to_string(),
            scope.project_id.to_string()
        ],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_task(conn: &Connection, scope: Scope, task_id: TaskId) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL}
         WHERE t.task_uuid = ?1
           AND t.owner_uuid = ?2
           AND t.project_uuid = ?3;"
    ))?;
    let mut rows = stmt.query(params![
        task_id.to_string(),
        scope.owner_id.to_string(),
        scope.project_id.to_string()
    ])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

fn load_edges(conn: &Connection, scope: Scope) -> RepoResult<Vec<DependencyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT blocked_uuid, blocker_uuid
         FROM task_dependencies
         WHERE owner_uuid = ?1
           AND project_uuid = ?2
         ORDER BY blocked_uuid ASC, blocker_uuid ASC;",
    )?;
    let mut rows = stmt.query(params![
        scope.owner_id.to_string(),
        scope.project_id.to_string()
    ])?;

    let mut edges = Vec::new();
    while let Some(row) = rows.next()? {
        let blocked: String = row.get(0)?;
        let blocker: String = row.get(1)?;
        edges.push(DependencyEdge::new(
            parse_uuid(&blocked, "task_dependencies.blocked_uuid")?,
            parse_uuid(&blocker, "task_dependencies.blocker_uuid")?,
        ));
    }
    Ok(edges)
}

fn collect_tasks(mut rows: rusqlite::Rows<'_>) -> RepoResult<Vec<Task>> {
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let task_uuid: String = row.get("task_uuid")?;
    let project_uuid: String = row.get("project_uuid")?;
    let owner_uuid: String = row.get("owner_uuid")?;

    let status_text: String = row.get("status")?;
    let status = parse_task_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task status `{status_text}` in tasks.status"))
    })?;

    let task = Task {
        task_id: parse_uuid(&task_uuid, "tasks.task_uuid")?,
        project_id: parse_uuid(&project_uuid, "tasks.project_uuid")?,
        owner_id: parse_uuid(&owner_uuid, "tasks.owner_uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    task.validate()?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::{ChangeSet, SqliteTaskRepository, TaskRepository};
    use crate::db::open_db_in_memory;
    use crate::model::dependency::DependencyEdge;
    use crate::model::project::{NewProject, Project};
    use crate::model::task::{NewTask, Task};
    use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
    use crate::repo::RepoError;
    use uuid::Uuid;

    #[test]
    fn change_set_builders_mark_it_non_empty() {
        assert!(ChangeSet::new().is_empty());
        assert!(ChangeSet::new().remove_edges(Vec::<DependencyEdge>::new()).is_empty());

        let edge = DependencyEdge::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(!ChangeSet::new().add_edge(edge).is_empty());
        assert!(!ChangeSet::new().remove_edges([edge]).is_empty());
        assert!(!ChangeSet::new().delete_task(edge.blocked).is_empty());
    }

    #[test]
    fn empty_change_set_persists_nothing() {
        let conn = open_db_in_memory().unwrap();
        let project = Project::new(
            Uuid::new_v4(),
            &NewProject {
                name: "Scratch".to_string(),
                description: String::new(),
            },
        );
        SqliteProjectRepository::try_new(&conn)
            .unwrap()
            .create_project(&project)
            .unwrap();
        let repo = SqliteTaskRepository::try_new(&conn).unwrap();
        let scope = project.scope();

        repo.in_scope_transaction(scope, |tx| -> Result<(), RepoError> {
            tx.persist(&ChangeSet::new())
        })
        .unwrap();
        assert!(repo.list_tasks(scope).unwrap().is_empty());

        let task = Task::new(scope, &NewTask::named("kept"));
        repo.in_scope_transaction(scope, |tx| -> Result<(), RepoError> {
            tx.persist(&ChangeSet::new().create_task(task.clone()))
        })
        .unwrap();
        assert_eq!(repo.list_tasks(scope).unwrap().len(), 1);
        assert!(repo.load_edges(scope).unwrap().is_empty());
    }
}
