//! Explicit ordering graph and topological sort.
//!
//! The graph only contains edges the user declared with `after`/`before`.
//! Access conflicts never add edges: they only keep two systems out of the
//! same wave, which the wave assignor handles on its own.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::declaration::{SystemDescriptor, SystemId};

/// `before` must finish in an earlier wave than `after` starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyEdge {
    /// The system that runs first.
    pub before: SystemId,
    /// The system that runs second.
    pub after: SystemId,
}

/// A directed graph over system ids built from explicit ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    successors: BTreeMap<SystemId, BTreeSet<SystemId>>,
    predecessors: BTreeMap<SystemId, BTreeSet<SystemId>>,
}

impl DependencyGraph {
    /// Create a graph with the given nodes and no edges.
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = SystemId>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            graph.successors.entry(node).or_default();
            graph.predecessors.entry(node).or_default();
        }
        graph
    }

    /// Build the graph from resolved descriptors.
    ///
    /// "A after X" yields `X → A`; "A before X" yields `A → X`. Targets that
    /// are not among `descriptors` are ignored.
    #[must_use]
    pub fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a SystemDescriptor> + Clone,
    ) -> Self {
        let mut graph = Self::new(descriptors.clone().into_iter().map(|d| d.id));
        for descriptor in descriptors {
            for &target in &descriptor.after {
                graph.add_edge(DependencyEdge {
                    before: target,
                    after: descriptor.id,
                });
            }
            for &target in &descriptor.before {
                graph.add_edge(DependencyEdge {
                    before: descriptor.id,
                    after: target,
                });
            }
        }
        graph
    }

    /// Add an edge between two known nodes. Returns `false` if either end is
    /// unknown or the edge already exists.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> bool {
        if !self.contains(edge.before) || !self.contains(edge.after) {
            return false;
        }
        let fresh = self
            .successors
            .entry(edge.before)
            .or_default()
            .insert(edge.after);
        self.predecessors
            .entry(edge.after)
            .or_default()
            .insert(edge.before);
        fresh
    }

    /// Returns `true` if `id` is a node.
    #[must_use]
    pub fn contains(&self, id: SystemId) -> bool {
        self.successors.contains_key(&id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.successors.keys().copied()
    }

    /// Systems that must run before `id`.
    pub fn predecessors(&self, id: SystemId) -> impl Iterator<Item = SystemId> + '_ {
        self.predecessors.get(&id).into_iter().flatten().copied()
    }

    /// Systems that must run after `id`.
    pub fn successors(&self, id: SystemId) -> impl Iterator<Item = SystemId> + '_ {
        self.successors.get(&id).into_iter().flatten().copied()
    }

    /// All edges, ordered by `(before, after)`.
    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.successors.iter().flat_map(|(&before, afters)| {
            afters.iter().map(move |&after| DependencyEdge { before, after })
        })
    }

    /// Kahn's algorithm with ascending-id tie-break.
    ///
    /// Whenever several nodes are ready, the smallest id goes first, so the
    /// result depends only on the graph and never on insertion order.
    ///
    /// # Errors
    ///
    /// If the graph has a cycle, returns every node that could not be placed,
    /// in ascending id order.
    pub fn topological_order(&self) -> Result<Vec<SystemId>, Vec<SystemId>> {
        let mut in_degree: BTreeMap<SystemId, usize> = self
            .predecessors
            .iter()
            .map(|(&id, preds)| (id, preds.len()))
            .collect();

        let mut ready: BinaryHeap<Reverse<SystemId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.node_count());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for next in self.successors(id) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }

        if order.len() == self.node_count() {
            Ok(order)
        } else {
            let placed: BTreeSet<SystemId> = order.into_iter().collect();
            Err(self.nodes().filter(|id| !placed.contains(id)).collect())
        }
    }
}
