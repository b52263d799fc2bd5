//! Blocking-relation DAG and reachability search.
//!
//! # Edge direction
//!
//! Adjacency follows "depends on": `blocked -> blocker`. Adding
//! `blocked -> blocker` closes a cycle exactly when `blocked` is already
//! reachable from `blocker`.

use crate::model::dependency::DependencyEdge;
use crate::model::task::TaskId;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Task id -> direct blockers of that task.
pub type Adjacency = HashMap<TaskId, BTreeSet<TaskId>>;

static NO_TASKS: BTreeSet<TaskId> = BTreeSet::new();

/// Rejections raised by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Edge would close a cycle. `path` runs `blocked -> blocker -> ... -> blocked`.
    Cycle {
        blocked: TaskId,
        blocker: TaskId,
        path: Vec<TaskId>,
    },
    /// Edge is already present.
    DuplicateEdge { blocked: TaskId, blocker: TaskId },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle {
                blocked, blocker, ..
            } if blocked == blocker => write!(f, "task {blocked} cannot depend on itself"),
            Self::Cycle {
                blocked,
                blocker,
                path,
            } => write!(
                f,
                "dependency {blocked} blocked by {blocker} would create a cycle of {} tasks",
                path.len().saturating_sub(1)
            ),
            Self::DuplicateEdge { blocked, blocker } => {
                write!(f, "task {blocked} is already blocked by {blocker}")
            }
        }
    }
}

impl Error for GraphError {}

/// Finds a depends-on path from `from` to `to`.
///
/// Breadth-first over `adjacency`; neighbours are visited in id order so the
/// returned path is deterministic. Returns `[from]` when `from == to`.
pub fn blocking_path(adjacency: &Adjacency, from: TaskId, to: TaskId) -> Option<Vec<TaskId>> {
    if from == to {
        return Some(vec![from]);
    }

    let mut queue = VecDeque::from([from]);
    let mut parent: HashMap<TaskId, TaskId> = HashMap::from([(from, from)]);

    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(&current).unwrap_or(&NO_TASKS) {
            if parent.contains_key(&next) {
                continue;
            }
            parent.insert(next, current);
            if next == to {
                return Some(rebuild_path(&parent, from, to));
            }
            queue.push_back(next);
        }
    }

    None
}

fn rebuild_path(parent: &HashMap<TaskId, TaskId>, from: TaskId, to: TaskId) -> Vec<TaskId> {
    let mut path = vec![to];
    let mut cursor = to;
    while cursor != from {
        match parent.get(&cursor) {
            Some(previous) => {
                cursor = *previous;
                path.push(cursor);
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    OnPath,
    Done,
}

/// Ephemeral blocking graph for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    blockers: Adjacency,
    dependents: Adjacency,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from already persisted edges.
    ///
    /// Edges are taken as-is; use [`DependencyGraph::find_cycle`] to verify
    /// data that did not pass through [`DependencyGraph::add_edge`].
    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.insert_unchecked(edge);
        }
        graph
    }

    /// Returns whether `blocked` may start depending on `blocker`.
    pub fn can_add_edge(&self, blocked: TaskId, blocker: TaskId) -> bool {
        blocked != blocker && blocking_path(&self.blockers, blocker, blocked).is_none()
    }

    /// Inserts `blocked -> blocker` when it keeps the graph acyclic.
    pub fn add_edge(&mut self, blocked: TaskId, blocker: TaskId) -> Result<(), GraphError> {
        if self.contains_edge(blocked, blocker) {
            return Err(GraphError::DuplicateEdge { blocked, blocker });
        }
        if let Some(back_path) = blocking_path(&self.blockers, blocker, blocked) {
            let mut path = Vec::with_capacity(back_path.len() + 1);
            path.push(blocked);
            path.extend(back_path);
            return Err(GraphError::Cycle {
                blocked,
                blocker,
                path,
            });
        }

        self.insert_unchecked(DependencyEdge::new(blocked, blocker));
        Ok(())
    }

    /// Removes `blocked -> blocker`. Returns `false` when it was absent.
    pub fn remove_edge(&mut self, blocked: TaskId, blocker: TaskId) -> bool {
        let removed = detach(&mut self.blockers, blocked, blocker);
        detach(&mut self.dependents, blocker, blocked);
        removed
    }

    /// Removes every edge touching `task` and returns them in id order.
    pub fn remove_task(&mut self, task: TaskId) -> Vec<DependencyEdge> {
        let mut removed = Vec::new();

        for blocker in self.blockers.remove(&task).unwrap_or_default() {
            detach(&mut self.dependents, blocker, task);
            removed.push(DependencyEdge::new(task, blocker));
        }
        for blocked in self.dependents.remove(&task).unwrap_or_default() {
            detach(&mut self.blockers, blocked, task);
            removed.push(DependencyEdge::new(blocked, task));
        }

        removed.sort_unstable();
        removed
    }

    pub fn contains_edge(&self, blocked: TaskId, blocker: TaskId) -> bool {
        self.blockers
            .get(&blocked)
            .is_some_and(|set| set.contains(&blocker))
    }

    /// Direct blockers of `task`.
    pub fn blockers_of(&self, task: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.blockers.get(&task).unwrap_or(&NO_TASKS).iter().copied()
    }

    /// Tasks directly blocked by `task`.
    pub fn dependents_of(&self, task: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.dependents.get(&task).unwrap_or(&NO_TASKS).iter().copied()
    }

    /// All edges, sorted.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .blockers
            .iter()
            .flat_map(|(blocked, set)| {
                set.iter()
                    .map(move |blocker| DependencyEdge::new(*blocked, *blocker))
            })
            .collect();
        edges.sort_unstable();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.blockers.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// Returns one cycle as `a -> ... -> a`, or `None` for a DAG.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut state: HashMap<TaskId, VisitState> = HashMap::new();
        let mut roots: Vec<TaskId> = self.blockers.keys().copied().collect();
        roots.sort_unstable();

        for root in roots {
            if state.contains_key(&root) {
                continue;
            }

            state.insert(root, VisitState::OnPath);
            let mut path = vec![root];
            let mut pending = vec![self.blockers.get(&root).unwrap_or(&NO_TASKS).iter()];

            while let Some(children) = pending.last_mut() {
                match children.next().copied() {
                    Some(next) => match state.get(&next) {
                        Some(VisitState::OnPath) => {
                            let start = path.iter().position(|id| *id == next).unwrap_or(0);
                            let mut cycle = path[start..].to_vec();
                            cycle.push(next);
                            return Some(cycle);
                        }
                        Some(VisitState::Done) => {}
                        None => {
                            state.insert(next, VisitState::OnPath);
                            path.push(next);
                            pending.push(self.blockers.get(&next).unwrap_or(&NO_TASKS).iter());
                        }
                    },
                    None => {
                        pending.pop();
                        if let Some(finished) = path.pop() {
                            state.insert(finished, VisitState::Done);
                        }
                    }
                }
            }
        }

        None
    }

    fn insert_unchecked(&mut self, edge: DependencyEdge) {
        self.blockers
            .entry(edge.blocked)
            .or_default()
            .insert(edge.blocker);
        self.dependents
            .entry(edge.blocker)
            .or_default()
            .insert(edge.blocked);
    }
}

fn detach(adjacency: &mut Adjacency, key: TaskId, value: TaskId) -> bool {
    let Some(set) = adjacency.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        adjacency.remove(&key);
    }
    removed
}
