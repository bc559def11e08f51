//! Shared, concurrently readable run context.

use dashmap::DashMap;
use serde_json::Value;

use crate::result::NodeResult;
use crate::state::TaskState;

/// State shared across all node invocations of one run.
///
/// Workers hold the context behind an `Arc` and read concurrently; the
/// executor's control loop is the only writer of results and states, so
/// readers never observe a partially recorded result.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    /// The payload the run was started with.
    flow_input: Value,
    /// Completed node results, keyed by node id.
    results: DashMap<String, NodeResult>,
    /// Current node states, keyed by node id.
    states: DashMap<String, TaskState>,
    /// Free-form scratch values nodes may exchange out of band.
    vars: DashMap<String, Value>,
}

impl ExecutionContext {
    /// A fresh context for one run.
    #[must_use]
    pub fn new(flow_input: Value) -> Self {
        Self {
            flow_input,
            ..Self::default()
        }
    }

    /// The payload the run was started with.
    #[must_use]
    pub fn flow_input(&self) -> &Value {
        &self.flow_input
    }

    /// Record a node's result. Later writes for the same node replace
    /// earlier ones (a retried node keeps only its final result).
    pub fn record_result(&self, result: NodeResult) {
        self.results.insert(result.node_id.clone(), result);
    }

    /// A completed node's result, cloned out of the shared map.
    #[must_use]
    pub fn result_of(&self, node_id: &str) -> Option<NodeResult> {
        self.results.get(node_id).map(|entry| entry.clone())
    }

    /// Record a node's current state.
    pub fn record_state(&self, node_id: impl Into<String>, state: TaskState) {
        self.states.insert(node_id.into(), state);
    }

    /// A node's current state, `Pending` if never recorded.
    #[must_use]
    pub fn state_of(&self, node_id: &str) -> TaskState {
        self.states
            .get(node_id)
            .map_or(TaskState::Pending, |entry| *entry)
    }

    /// Snapshot of every recorded state.
    #[must_use]
    pub fn states(&self) -> Vec<(String, TaskState)> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Set a scratch variable.
    pub fn set_var(&self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Read a scratch variable.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<Value> {
        self.vars.get(key).map(|entry| entry.clone())
    }
}
