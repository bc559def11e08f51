//! Engine error types.

use thiserror::Error;

use crate::executor::ExecutionState;

/// Errors surfaced before or instead of a run.
///
/// Failures of individual nodes are not errors at this level; they are
/// reported through [`crate::FlowResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying graph could not be analyzed.
    #[error(transparent)]
    Graph(#[from] cascade_graph::GraphError),

    /// A graph node names a type the registry does not know.
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType {
        /// The offending node.
        node_id: String,
        /// The unregistered type name.
        node_type: String,
    },

    /// A registered factory refused to build a node.
    #[error("failed to build node '{node_id}': {source}")]
    NodeBuild {
        /// The offending node.
        node_id: String,
        /// The factory's error.
        #[source]
        source: anyhow::Error,
    },

    /// The executor was asked to run while not in a runnable state.
    #[error("cannot start a run while executor is {0}")]
    InvalidState(ExecutionState),
}
