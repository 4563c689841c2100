//! Directed dependency graph over task ids.
//!
//! Wraps a `petgraph` graph map keyed by [`TaskId`] with [`LinkType`]
//! edge data. Mutations guard acyclicity: an edge is inserted
//! speculatively, checked, and rolled back before the error returns, so
//! a rejected call leaves the graph unchanged. Link types are plain
//! directed edges as far as cycle detection is concerned.

use crate::error::GraphError;
use crate::types::{DependencyLink, LinkType, TaskId};
use parking_lot::RwLock;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::HashSet;

#[derive(Debug)]
pub struct DependencyGraph {
    inner: RwLock<DiGraphMap<TaskId, LinkType>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DiGraphMap::new()),
        }
    }

    /// Bulk-load a persisted link set, then verify acyclicity once.
    ///
    /// Fails with [`GraphError::CycleDetected`] when the persisted set is
    /// already cyclic; callers treat that as data corruption, not as a
    /// rejected mutation.
    pub fn hydrate(links: impl IntoIterator<Item = DependencyLink>) -> Result<Self, GraphError> {
        let mut g = DiGraphMap::new();
        for link in links {
            if link.source == link.target {
                return Err(GraphError::SelfDependency(link.source));
            }
            g.add_edge(link.source, link.target, link.link_type);
        }
        if is_cyclic_directed(&g) {
            return Err(GraphError::CycleDetected);
        }
        Ok(Self {
            inner: RwLock::new(g),
        })
    }

    pub fn add_link(&self, link: DependencyLink) -> Result<(), GraphError> {
        if link.source == link.target {
            return Err(GraphError::SelfDependency(link.source));
        }

        let mut g = self.inner.write();
        let existed = g.contains_edge(link.source, link.target);
        g.add_edge(link.source, link.target, link.link_type);

        // A pre-existing edge cannot introduce a cycle; only check fresh ones.
        if !existed && is_cyclic_directed(&*g) {
            g.remove_edge(link.source, link.target);
            return Err(GraphError::CycleDetected);
        }

        Ok(())
    }

    pub fn remove_link(&self, source: TaskId, target: TaskId) -> Result<LinkType, GraphError> {
        let mut g = self.inner.write();
        g.remove_edge(source, target)
            .ok_or(GraphError::LinkNotFound { from: source, target })
    }

    /// Drop a task and every incident edge; returns its former direct
    /// successors so the caller can recompute their schedules.
    pub fn detach_task(&self, task_id: TaskId) -> Vec<TaskId> {
        let mut g = self.inner.write();
        if !g.contains_node(task_id) {
            return Vec::new();
        }
        let successors: Vec<TaskId> = g.neighbors_directed(task_id, Direction::Outgoing).collect();
        g.remove_node(task_id);
        successors
    }

    #[must_use]
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.inner.read().contains_node(task_id)
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.read().node_count()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.inner.read().edge_count()
    }

    #[must_use]
    pub fn links(&self) -> Vec<DependencyLink> {
        let g = self.inner.read();
        g.all_edges()
            .map(|(source, target, link_type)| DependencyLink {
                source,
                target,
                link_type: *link_type,
            })
            .collect()
    }

    /// Direct predecessors with the link type constraining each.
    #[must_use]
    pub fn predecessors(&self, task_id: TaskId) -> Vec<(TaskId, LinkType)> {
        let g = self.inner.read();
        g.neighbors_directed(task_id, Direction::Incoming)
            .map(|p| {
                let link_type = *g.edge_weight(p, task_id).expect("edge exists for neighbor");
                (p, link_type)
            })
            .collect()
    }

    #[must_use]
    pub fn successors(&self, task_id: TaskId) -> Vec<TaskId> {
        self.inner
            .read()
            .neighbors_directed(task_id, Direction::Outgoing)
            .collect()
    }

    /// Every task reachable from `task_id` along outgoing edges,
    /// excluding `task_id` itself.
    #[must_use]
    pub fn transitive_successors(&self, task_id: TaskId) -> HashSet<TaskId> {
        let g = self.inner.read();
        let mut seen = HashSet::new();
        let mut stack = vec![task_id];
        while let Some(current) = stack.pop() {
            for next in g.neighbors_directed(current, Direction::Outgoing) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    /// Tasks with no predecessors.
    #[must_use]
    pub fn roots(&self) -> Vec<TaskId> {
        let g = self.inner.read();
        g.nodes()
            .filter(|n| g.neighbors_directed(*n, Direction::Incoming).next().is_none())
            .collect()
    }

    /// Tasks with no successors.
    #[must_use]
    pub fn leaves(&self) -> Vec<TaskId> {
        let g = self.inner.read();
        g.nodes()
            .filter(|n| g.neighbors_directed(*n, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// Full dependency order. Fails with [`GraphError::CycleDetected`]
    /// only if the insertion-time guard was somehow bypassed; the
    /// scheduler re-validates through this before each recompute.
    pub fn topo_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let g = self.inner.read();
        toposort(&*g, None).map_err(|_| GraphError::CycleDetected)
    }
}
