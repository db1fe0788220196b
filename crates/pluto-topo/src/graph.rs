//! Dependency graph construction.

use crate::{Node, SortError};
use pluto_arch::{Architecture, Argument, EntityKind, RelationshipKind};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// Nodes keyed by content hash, with an edge from each dependency to its dependent.
pub struct DependencyGraph<'a> {
    graph: DiGraph<Node<'a>, ()>,
    index: HashMap<String, NodeIndex>,
}

impl<'a> DependencyGraph<'a> {
    pub fn build(arch: &'a Architecture) -> Result<Self, SortError> {
        let mut this = DependencyGraph {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        let mut resources = HashMap::new();
        for res in arch.resources() {
            let idx = this.add_node(Node::Resource(res))?;
            resources.insert(res.id.as_str(), idx);
        }
        let mut closures = HashMap::new();
        for closure in arch.closures() {
            let idx = this.add_node(Node::Closure(closure))?;
            closures.insert(closure.id.as_str(), idx);
        }

        let resource = |id: &str| {
            resources
                .get(id)
                .copied()
                .ok_or_else(|| SortError::InvalidArchitecture(format!("resource '{}'", id)))
        };
        let closure = |id: &str| {
            closures
                .get(id)
                .copied()
                .ok_or_else(|| SortError::InvalidArchitecture(format!("closure '{}'", id)))
        };

        // A resource is constructed after the closures it is given.
        for res in arch.resources() {
            let target = resource(&res.id)?;
            for arg in &res.arguments {
                if let Argument::Closure { closure_id, .. } = arg {
                    this.graph.add_edge(closure(closure_id)?, target, ());
                }
            }
        }

        for relat in arch.relationships() {
            match relat.kind {
                RelationshipKind::Create => {
                    let node = this.add_node(Node::Relationship(relat))?;
                    this.graph.add_edge(resource(&relat.from.id)?, node, ());
                    for arg in &relat.arguments {
                        let source = match arg {
                            Argument::Text { .. } => continue,
                            Argument::Resource { resource_id, .. }
                            | Argument::CapturedProperty { resource_id, .. } => {
                                resource(resource_id)?
                            }
                            Argument::Closure { closure_id, .. } => closure(closure_id)?,
                        };
                        this.graph.add_edge(source, node, ());
                    }
                }
                RelationshipKind::MethodCall | RelationshipKind::PropertyAccess => {
                    let target = closure(&relat.from.id)?;
                    let source = match relat.target_resource() {
                        Some(id) => resource(id)?,
                        None => {
                            return Err(SortError::InvalidArchitecture(format!(
                                "the resource accessed by {}",
                                relat.from
                            )))
                        }
                    };
                    this.graph.add_edge(source, target, ());
                }
            }
        }

        debug!(
            nodes = this.graph.node_count(),
            edges = this.graph.edge_count(),
            "built dependency graph"
        );
        Ok(this)
    }

    pub fn inner(&self) -> &DiGraph<Node<'a>, ()> {
        &self.graph
    }

    fn add_node(&mut self, node: Node<'a>) -> Result<NodeIndex, SortError> {
        let id = node_id(&node)?;
        if self.index.contains_key(&id) {
            return Err(SortError::DuplicateNode(id));
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(idx)
    }
}

/// `<kind>_` followed by the first 8 hex digits of the SHA-256 of the node's JSON.
///
/// The JSON includes the entity id, which the persisted form keeps as a map key.
pub fn node_id(node: &Node<'_>) -> Result<String, SortError> {
    let (prefix, snapshot) = match node {
        Node::Resource(res) => (
            "resource",
            json!({ "kind": EntityKind::Resource, "id": res.id, "entity": serde_json::to_value(res)? }),
        ),
        Node::Closure(closure) => (
            "closure",
            json!({ "kind": EntityKind::Closure, "id": closure.id, "entity": serde_json::to_value(closure)? }),
        ),
        Node::Relationship(relat) => ("relationship", serde_json::to_value(relat)?),
    };
    let digest = Sha256::digest(serde_json::to_vec(&snapshot)?);
    Ok(format!("{}_{}", prefix, &hex::encode(digest)[..8]))
}

impl std::fmt::Debug for DependencyGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_arch::{Closure, Relationship};

    #[test]
    fn test_node_id_shape() {
        let closure = Closure::inline("handler");
        let id = node_id(&Node::Closure(&closure)).unwrap();
        assert!(id.starts_with("closure_"));
        assert_eq!(id.len(), "closure_".len() + 8);
        assert_eq!(id, node_id(&Node::Closure(&closure)).unwrap());
    }

    #[test]
    fn test_identical_closures_differ_by_id() {
        let a = Closure::inline("a");
        let b = Closure::inline("b");
        assert_ne!(
            node_id(&Node::Closure(&a)).unwrap(),
            node_id(&Node::Closure(&b)).unwrap()
        );
    }

    #[test]
    fn test_relationship_hash_is_content() {
        let a = Relationship::client("h", "r", "get");
        let b = Relationship::client("h", "r", "get");
        assert_eq!(
            node_id(&Node::Relationship(&a)).unwrap(),
            node_id(&Node::Relationship(&b)).unwrap()
        );
    }
}
