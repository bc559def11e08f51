#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Graph
//!
//! The DAG model for the Cascade workflow engine.
//!
//! A [`Graph`] is built once from node and edge collections, then frozen by a
//! one-time topology analysis that derives everything the scheduler needs:
//!
//! - forward and reverse adjacency (direct dependents / predecessors)
//! - per-node input wiring (which upstream ports feed which input ports)
//! - per-node in-degree, counted per distinct upstream node
//! - the maximum parallelism (width of the widest Kahn layer)
//!
//! Initialization fails with [`GraphError::CycleDetected`] if the graph is
//! not acyclic. After initialization the node/edge lists are immutable.

pub mod edge;
pub mod error;
pub mod graph;
pub mod node;

pub use edge::GraphEdge;
pub use error::GraphError;
pub use graph::{Graph, InputBinding};
pub use node::GraphNode;

/// Default output port name used when an edge does not name one.
pub const DEFAULT_OUTPUT_PORT: &str = "output";

/// Default input port name used when an edge does not name one.
pub const DEFAULT_INPUT_PORT: &str = "input";
