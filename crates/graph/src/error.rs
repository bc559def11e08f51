//! Graph-specific error types.

use thiserror::Error;

/// Errors that can occur during graph construction or topology analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph contains a cycle and is not a DAG.
    #[error("cycle detected in workflow graph")]
    CycleDetected,

    /// The node/edge lists were mutated after the topology was frozen.
    #[error("graph is already initialized; nodes and edges are frozen")]
    AlreadyInitialized,
}
