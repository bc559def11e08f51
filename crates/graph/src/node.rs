//! Workflow graph node.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single node in the workflow graph.
///
/// The engine only interprets `id` and `type`; `data` is handed opaquely to
/// the task-node constructor registered for the type, and `extra` carries
/// unstructured passthrough attributes (layout position, size, ...) that the
/// engine never consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique, stable node identifier.
    pub id: String,
    /// Node-kind discriminator used for task-node dispatch.
    #[serde(rename = "type", default)]
    pub node_type: String,
    /// Node-kind-specific configuration, opaque to the engine.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Passthrough attributes (e.g. layout metadata).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphNode {
    /// Create a node with the given id and type.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: Map::new(),
            extra: Map::new(),
        }
    }

    /// Add a configuration entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns `true` if the node carries a usable (non-blank) id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

impl PartialEq for GraphNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GraphNode {}

impl std::hash::Hash for GraphNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
