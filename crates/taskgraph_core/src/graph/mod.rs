//! Dependency graph over the task-blocking relation.
//!
//! # Responsibility
//! - Decide whether a proposed blocking edge keeps a scope acyclic.
//! - Apply edge/node mutations on an ephemeral per-scope adjacency.
//!
//! # Invariants
//! - A graph instance holds the edges of exactly one scope.
//! - Acyclicity is checked on insertion and never repaired afterwards.
//! - Instances are rebuilt from persisted edges per transaction, never cached.

pub mod dependency_graph;
