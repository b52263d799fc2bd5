//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the dependency-graph decision for every task/edge mutation.

pub mod project_service;
pub mod task_service;
