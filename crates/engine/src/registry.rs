//! Mapping from graph node types to executable behaviors.

use std::sync::Arc;

use cascade_graph::GraphNode;
use dashmap::DashMap;

use crate::error::EngineError;
use crate::node::TaskNode;
use crate::nodes::{OutputNode, StartNode};

/// Builds a [`TaskNode`] from the graph node it is bound to.
pub type NodeFactory =
    Arc<dyn Fn(&GraphNode) -> anyhow::Result<Arc<dyn TaskNode>> + Send + Sync>;

/// Registry of node type names to factories.
///
/// Instantiation is all-or-nothing: the executor resolves every graph node
/// up front, so an unknown type is rejected before anything runs.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: Arc<DashMap<String, NodeFactory>>,
}

impl NodeRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the `start` and `output` built-ins.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("start", |node| {
            Ok(Arc::new(StartNode::new(&node.id)) as Arc<dyn TaskNode>)
        });
        registry.register("output", |node| {
            Ok(Arc::new(OutputNode::new(&node.id)) as Arc<dyn TaskNode>)
        });
        registry
    }

    /// Register a factory for a type name, replacing any previous one.
    pub fn register<F>(&self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&GraphNode) -> anyhow::Result<Arc<dyn TaskNode>> + Send + Sync + 'static,
    {
        self.factories.insert(node_type.into(), Arc::new(factory));
    }

    /// Returns `true` if a factory is registered for this type name.
    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Instantiate the behavior for one graph node.
    pub fn build(&self, node: &GraphNode) -> Result<Arc<dyn TaskNode>, EngineError> {
        let factory = self
            .factories
            .get(&node.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;
        factory(node).map_err(|source| EngineError::NodeBuild {
            node_id: node.id.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> =
            self.factories.iter().map(|e| e.key().clone()).collect();
        types.sort();
        f.debug_struct("NodeRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_node(id: &str, node_type: &str) -> GraphNode {
        GraphNode::new(id, node_type)
    }

    #[test]
    fn builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.contains("start"));
        assert!(registry.contains("output"));
        assert!(!registry.contains("http"));
    }

    #[test]
    fn build_resolves_factory() {
        let registry = NodeRegistry::with_builtins();
        let node = registry.build(&graph_node("entry", "start")).unwrap();
        assert_eq!(node.id(), "entry");
        assert_eq!(node.node_type(), "start");
        assert!(node.is_start());
    }

    #[test]
    fn unknown_type_rejected() {
        let registry = NodeRegistry::with_builtins();
        match registry.build(&graph_node("n1", "teleport")) {
            Err(EngineError::UnknownNodeType { node_id, node_type }) => {
                assert_eq!(node_id, "n1");
                assert_eq!(node_type, "teleport");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("unknown type must be rejected"),
        }
    }

    #[test]
    fn register_replaces() {
        let registry = NodeRegistry::new();
        registry.register("start", |node| {
            Ok(Arc::new(StartNode::new(&node.id)) as Arc<dyn TaskNode>)
        });
        assert!(registry.contains("start"));
    }
}
