//! Core domain logic for task dependency tracking.
//! This crate is the single source of truth for the acyclic blocking graph.

pub mod config;
pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbOptions};
pub use graph::dependency_graph::{blocking_path, DependencyGraph, GraphError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::dependency::DependencyEdge;
pub use model::project::{NewProject, OwnerId, Project, ProjectId, ProjectPatch, Scope};
pub use model::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};
pub use model::ValidationError;
pub use repo::project_repo::{ProjectDeletion, ProjectRepository, SqliteProjectRepository};
pub use repo::task_repo::{ChangeSet, ScopeTransaction, SqliteTaskRepository, TaskRepository};
pub use repo::{RepoError, RepoResult};
pub use service::project_service::{ProjectService, ProjectServiceError};
pub use service::task_service::{RetryPolicy, TaskService, TaskServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
