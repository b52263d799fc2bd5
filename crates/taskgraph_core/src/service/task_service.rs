//! Task and dependency use-case service.
//!
//! # Responsibility
//! - Translate task/dependency requests into dependency-graph decisions.
//! - Persist each decision through one repository scope transaction.
//! - Retry whole operations that lost a write-lock race.
//!
//! # Invariants
//! - The dependency graph is rebuilt from persisted edges inside the same
//!   transaction that writes the result; it is never cached across calls.
//! - A rejected mutation (cycle, duplicate, missing task) persists nothing.
//! - A task is deleted only together with every edge touching it.

use crate::db::DbError;
use crate::graph::dependency_graph::{DependencyGraph, GraphError};
use crate::model::dependency::DependencyEdge;
use crate::model::project::{OwnerId, ProjectId, Scope};
use crate::model::task::{NewTask, Task, TaskId, TaskPatch};
use crate::model::ValidationError;
use crate::repo::task_repo::{ChangeSet, ScopeTransaction, TaskRepository};
use crate::repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Default number of attempts for an operation that hits a lock conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How often a conflicting mutation is re-run from a fresh read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` is treated as `1`.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first conflict.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1 }
    }
}

/// Errors from task/dependency service operations.
#[derive(Debug)]
pub enum TaskServiceError {
    /// Task attributes are invalid.
    Validation(ValidationError),
    /// Project does not exist or belongs to another owner.
    ProjectNotFound(ProjectId),
    /// Referenced task does not exist in the scope.
    TaskNotFound(TaskId),
    /// Edge would close a cycle; `path` runs `blocked -> blocker -> ... -> blocked`.
    Cycle {
        blocked: TaskId,
        blocker: TaskId,
        path: Vec<TaskId>,
    },
    /// Edge already exists.
    DuplicateDependency { blocked: TaskId, blocker: TaskId },
    /// Lost a concurrent write race on every attempt.
    Conflict(DbError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl TaskServiceError {
    /// Stable short code for log lines and caller-side mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::TaskNotFound(_) => "task_not_found",
            Self::Cycle { .. } => "cycle",
            Self::DuplicateDependency { .. } => "duplicate_dependency",
            Self::Conflict(_) => "conflict",
            Self::Repo(_) => "repo",
        }
    }

    /// Returns whether the caller made a request the graph refused.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Conflict(_) | Self::Repo(_))
    }
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Cycle {
                blocked, blocker, ..
            } if blocked == blocker => write!(f, "a task cannot depend on itself: {blocked}"),
            Self::Cycle {
                blocked, blocker, ..
            } => write!(
                f,
                "this dependency would create a cycle: {blocked} blocked by {blocker}"
            ),
            Self::DuplicateDependency { blocked, blocker } => {
                write!(f, "dependency already exists: {blocked} blocked by {blocker}")
            }
            Self::Conflict(err) => write!(f, "concurrent write conflict: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            RepoError::TaskNotFound(id) => Self::TaskNotFound(id),
            RepoError::Conflict(err) => Self::Conflict(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for TaskServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GraphError> for TaskServiceError {
    fn from(value: GraphError) -> Self {
        match value {
            GraphError::Cycle {
                blocked,
                blocker,
                path,
            } => Self::Cycle {
                blocked,
                blocker,
                path,
            },
            GraphError::DuplicateEdge { blocked, blocker } => {
                Self::DuplicateDependency { blocked, blocker }
            }
        }
    }
}

pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Task/dependency service facade.
pub struct TaskService<R: TaskRepository> {
    repo: R,
    retry: RetryPolicy,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates service with the default retry policy.
    pub fn new(repo: R) -> Self {
        Self::with_retry_policy(repo, RetryPolicy::default())
    }

    pub fn with_retry_policy(repo: R, retry: RetryPolicy) -> Self {
        Self { repo, retry }
    }

    /// Creates a task in the owner's project, optionally with initial blockers.
    ///
    /// # Contract
    /// - `ProjectNotFound` when the project is not owned by `owner_id`.
    /// - `TaskNotFound` when a listed blocker is not in the same scope.
    /// - `DuplicateDependency` when a blocker is listed twice.
    /// - Task row and initial edges persist together or not at all.
    pub fn create_task(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        request: &NewTask,
    ) -> TaskServiceResult<Task> {
        let scope = Scope::new(owner_id, project_id);
        let task = Task::new(scope, request);

        let result = self.insert_task(scope, &task, &request.blocked_by);
        log_outcome("task_create", scope, &result, Some(task.task_id));
        result
    }

    /// Applies `patch` to one task of the scope.
    pub fn update_task(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> TaskServiceResult<Task> {
        let scope = Scope::new(owner_id, project_id);
        let result = self.mutate("task_update", scope, |tx| {
            let mut task = require_task(tx, task_id)?;
            task.apply_patch(patch);
            task.validate()?;
            tx.persist(&ChangeSet::new().update_task(task))?;
            require_task(tx, task_id)
        });
        log_outcome("task_update", scope, &result, Some(task_id));
        result
    }

    /// Deletes one task after cascading every edge touching it.
    ///
    /// Returns the removed edges.
    pub fn delete_task(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> TaskServiceResult<Vec<DependencyEdge>> {
        let scope = Scope::new(owner_id, project_id);
        let result = self.mutate("task_delete", scope, |tx| {
            require_task(tx, task_id)?;
            let mut graph = load_graph(tx)?;
            let removed = graph.remove_task(task_id);

            let changes = ChangeSet::new()
                .remove_edges(removed.iter().copied())
                .delete_task(task_id);
            tx.persist(&changes)?;
            Ok(removed)
        });
        log_outcome("task_delete", scope, &result, Some(task_id));
        result
    }

    /// Records that `blocked` cannot be resolved before `blocker`.
    ///
    /// # Contract
    /// - `TaskNotFound` when either task is not in the scope.
    /// - `Cycle` when `blocked == blocker` or `blocker` already depends on
    ///   `blocked`, directly or transitively.
    /// - `DuplicateDependency` when the edge already exists.
    pub fn add_dependency(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        blocked: TaskId,
        blocker: TaskId,
    ) -> TaskServiceResult<DependencyEdge> {
        let scope = Scope::new(owner_id, project_id);
        let result = self.mutate("dependency_add", scope, |tx| {
            require_task(tx, blocked)?;
            require_task(tx, blocker)?;

            let mut graph = load_graph(tx)?;
            graph.add_edge(blocked, blocker)?;

            let edge = DependencyEdge::new(blocked, blocker);
            tx.persist(&ChangeSet::new().add_edge(edge))?;
            Ok(edge)
        });
        log_outcome("dependency_add", scope, &result, Some(blocked));
        result
    }

    /// Drops the `blocked`/`blocker` edge if present.
    ///
    /// Idempotent: returns `Ok(false)` when there was nothing to remove.
    pub fn remove_dependency(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        blocked: TaskId,
        blocker: TaskId,
    ) -> TaskServiceResult<bool> {
        let scope = Scope::new(owner_id, project_id);
        let result = self.mutate("dependency_remove", scope, |tx| {
            let mut graph = load_graph(tx)?;
            if !graph.remove_edge(blocked, blocker) {
                return Ok(false);
            }

            let edge = DependencyEdge::new(blocked, blocker);
            tx.persist(&ChangeSet::new().remove_edges([edge]))?;
            Ok(true)
        });
        log_outcome("dependency_remove", scope, &result, Some(blocked));
        result
    }

    /// Loads one task of the scope.
    pub fn get_task(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> TaskServiceResult<Task> {
        let scope = self.require_scope(owner_id, project_id)?;
        self.repo
            .get_task(scope, task_id)?
            .ok_or(TaskServiceError::TaskNotFound(task_id))
    }

    /// Lists tasks of the scope, oldest first.
    pub fn list_tasks(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> TaskServiceResult<Vec<Task>> {
        let scope = self.require_scope(owner_id, project_id)?;
        self.repo.list_tasks(scope).map_err(Into::into)
    }

    /// Lists the tasks that must be resolved before `task_id`.
    pub fn list_blockers(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> TaskServiceResult<Vec<Task>> {
        let scope = self.require_scope(owner_id, project_id)?;
        self.require_visible_task(scope, task_id)?;
        self.repo.list_blockers(scope, task_id).map_err(Into::into)
    }

    /// Lists the tasks waiting on `task_id`.
    pub fn list_dependents(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> TaskServiceResult<Vec<Task>> {
        let scope = self.require_scope(owner_id, project_id)?;
        self.require_visible_task(scope, task_id)?;
        self.repo.list_dependents(scope, task_id).map_err(Into::into)
    }

    /// Lists every dependency edge of the scope.
    pub fn list_dependencies(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> TaskServiceResult<Vec<DependencyEdge>> {
        let scope = self.require_scope(owner_id, project_id)?;
        self.repo.load_edges(scope).map_err(Into::into)
    }

    fn require_scope(
        &self,
        owner_id: OwnerId,
        project_id: ProjectId,
    ) -> TaskServiceResult<Scope> {
        let scope = Scope::new(owner_id, project_id);
        if !self.repo.scope_exists(scope)? {
            return Err(TaskServiceError::ProjectNotFound(project_id));
        }
        Ok(scope)
    }

    fn require_visible_task(&self, scope: Scope, task_id: TaskId) -> TaskServiceResult<()> {
        self.repo
            .get_task(scope, task_id)?
            .ok_or(TaskServiceError::TaskNotFound(task_id))?;
        Ok(())
    }

    fn insert_task(
        &self,
        scope: Scope,
        task: &Task,
        blocked_by: &[TaskId],
    ) -> TaskServiceResult<Task> {
        task.validate()?;
        self.mutate("task_create", scope, |tx| {
            for blocker in blocked_by {
                require_task(tx, *blocker)?;
            }

            let mut graph = load_graph(tx)?;
            let mut changes = ChangeSet::new().create_task(task.clone());
            for blocker in blocked_by {
                graph.add_edge(task.task_id, *blocker)?;
                changes = changes.add_edge(DependencyEdge::new(task.task_id, *blocker));
            }

            tx.persist(&changes)?;
            Ok(task.clone())
        })
    }

    fn mutate<T, F>(&self, operation: &'static str, scope: Scope, mut work: F) -> TaskServiceResult<T>
    where
        F: FnMut(&dyn ScopeTransaction) -> TaskServiceResult<T>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.repo.in_scope_transaction(scope, &mut work) {
                Err(TaskServiceError::Conflict(err)) if attempt < max_attempts => {
                    warn!(
                        "event={} module=service status=retry scope={} attempt={} max_attempts={} error={}",
                        operation, scope, attempt, max_attempts, err
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn require_task(tx: &dyn ScopeTransaction, task_id: TaskId) -> TaskServiceResult<Task> {
    tx.load_task(task_id)?
        .ok_or(TaskServiceError::TaskNotFound(task_id))
}

fn load_graph(tx: &dyn ScopeTransaction) -> TaskServiceResult<DependencyGraph> {
    let started_at = Instant::now();
    let graph = DependencyGraph::from_edges(tx.load_edges()?);
    if let Some(cycle) = graph.find_cycle() {
        let path = cycle
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(RepoError::InvalidData(format!(
            "persisted dependencies of scope {} contain a cycle: {path}",
            tx.scope()
        ))
        .into());
    }
    log::trace!(
        "event=graph_load module=service status=ok scope={} edges={} duration_us={}",
        tx.scope(),
        graph.edge_count(),
        started_at.elapsed().as_micros()
    );
    Ok(graph)
}

fn log_outcome<T>(
    operation: &'static str,
    scope: Scope,
    result: &TaskServiceResult<T>,
    task_id: Option<TaskId>,
) {
    let task = task_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    match result {
        Ok(_) => info!(
            "event={} module=service status=ok scope={} task={}",
            operation, scope, task
        ),
        Err(err) if err.is_rejection() => warn!(
            "event={} module=service status=rejected scope={} task={} reason={}",
            operation,
            scope,
            task,
            err.code()
        ),
        Err(err) => error!(
            "event={} module=service status=error scope={} task={} error_code={} error={}",
            operation,
            scope,
            task,
            err.code(),
            err
        ),
    }
}
