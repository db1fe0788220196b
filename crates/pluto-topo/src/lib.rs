//! Topological ordering of an architecture.
//!
//! Every resource, closure and provisioning-time relationship is a node. A node
//! comes after everything it needs: a resource after the closures passed to its
//! constructor, an infrastructure relationship after its caller and arguments,
//! and a closure after the resources it calls at runtime.
//!
//! Generators emit one statement per node in the returned order.

mod graph;

pub use graph::DependencyGraph;

use pluto_arch::{Closure, Relationship, Resource};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SortError {
    #[error("there is a cycle in the architecture")]
    CycleExists,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("the architecture is invalid, {0} cannot be found")]
    InvalidArchitecture(String),

    #[error("failed to hash node: {0}")]
    Hash(#[from] serde_json::Error),
}

/// One entry of the emission order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Resource(&'a Resource),
    Closure(&'a Closure),
    Relationship(&'a Relationship),
}

impl Node<'_> {
    /// The id of the underlying resource or closure; relationships have none.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Node::Resource(res) => Some(&res.id),
            Node::Closure(closure) => Some(&closure.id),
            Node::Relationship(_) => None,
        }
    }
}

/// Order the architecture so every node follows its dependencies.
///
/// Ties between ready nodes resolve to resources first (by name), then
/// closures (by id), then relationships in insertion order.
pub fn topo_sort(arch: &pluto_arch::Architecture) -> Result<Vec<Node<'_>>, SortError> {
    let graph = DependencyGraph::build(arch)?;
    let inner = graph.inner();

    let mut in_degree: Vec<usize> = inner
        .node_indices()
        .map(|idx| {
            inner
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .count()
        })
        .collect();

    let mut ready: VecDeque<_> = inner
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(inner.node_count());
    while let Some(idx) = ready.pop_front() {
        order.push(inner[idx]);
        let mut next: Vec<_> = inner.neighbors(idx).collect();
        // neighbors() walks edges newest first.
        next.reverse();
        for neighbor in next {
            let degree = &mut in_degree[neighbor.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(neighbor);
            }
        }
    }

    if order.len() != inner.node_count() {
        debug!(
            sorted = order.len(),
            total = inner.node_count(),
            "topological sort stopped early"
        );
        return Err(SortError::CycleExists);
    }

    info!(nodes = order.len(), "sorted architecture");
    Ok(order)
}

/// Strongly connected components with more than one node, or a self-loop.
///
/// Useful to name the members after [`topo_sort`] reports a cycle.
pub fn find_cycles(arch: &pluto_arch::Architecture) -> Result<Vec<Vec<Node<'_>>>, SortError> {
    let graph = DependencyGraph::build(arch)?;
    let inner = graph.inner();

    let cycles = petgraph::algo::tarjan_scc(inner)
        .into_iter()
        .filter(|scc| scc.len() > 1 || inner.contains_edge(scc[0], scc[0]))
        .map(|scc| scc.into_iter().map(|idx| inner[idx]).collect())
        .collect();
    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_arch::{Architecture, Argument};

    #[test]
    fn test_empty() {
        assert!(topo_sort(&Architecture::new()).unwrap().is_empty());
        assert!(find_cycles(&Architecture::new()).unwrap().is_empty());
    }

    #[test]
    fn test_constructor_closure_first() {
        let mut arch = Architecture::new();
        arch.add_closure(Closure::inline("func")).unwrap();
        arch.add_resource(Resource::new(
            "fn",
            "fn",
            "@plutolang/pluto.Function",
            vec![Argument::closure(0, "func", "func")],
        ))
        .unwrap();

        let order = topo_sort(&arch).unwrap();
        let ids: Vec<_> = order.iter().filter_map(Node::entity_id).collect();
        assert_eq!(ids, vec!["func", "fn"]);
    }
}
