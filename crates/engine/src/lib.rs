#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Engine
//!
//! The trigger-rule-driven scheduler for Cascade workflow graphs.
//!
//! A [`FlowExecutor`] wraps an initialized [`cascade_graph::Graph`],
//! instantiates one [`TaskNode`] per graph node through a [`NodeRegistry`],
//! and drives a completion-ordered scheduling loop: ready nodes run on a
//! bounded tokio pool, finished nodes re-evaluate their dependents'
//! [`TriggerRule`]s against the live predecessor-state set, recoverable
//! failures are retried with a delay, and nodes whose rule can never fire
//! are resolved to `Skipped`/`UpstreamFailed` and propagated transitively.
//!
//! Node behaviors are supplied by implementing [`TaskNode`]; the engine ships
//! only the thin `start`/`output` built-ins (see [`nodes`]).

pub mod context;
pub mod error;
pub mod executor;
pub mod inputs;
pub mod listener;
pub mod node;
pub mod nodes;
pub mod registry;
pub mod result;
pub mod state;
pub mod trigger;

pub use context::ExecutionContext;
pub use error::EngineError;
pub use executor::{ExecutionState, FlowExecutor};
pub use inputs::NodeInputs;
pub use listener::{ExecutionListener, NoopListener};
pub use node::{RetryPolicy, TaskNode};
pub use registry::NodeRegistry;
pub use result::{FlowResult, NodeOutput, NodeResult};
pub use state::TaskState;
pub use trigger::TriggerRule;
