//! Result and output value objects.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value emitted on one of a node's named output ports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// The raw payload.
    pub payload: Value,
}

impl NodeOutput {
    /// Wrap a payload.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

impl From<Value> for NodeOutput {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

/// The outcome of one node invocation (or of a terminal assignment made
/// without running the node, for skips and upstream failures).
///
/// Identity is keyed by `node_id`: a result is a value keyed by the node
/// that produced it, which is what the executor's failed-task set relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    /// The node this result belongs to. Stamped by the executor.
    pub node_id: String,
    /// Business success flag.
    pub success: bool,
    /// Failure or skip reason, when there is one.
    pub error: Option<String>,
    /// Whether the node was skipped rather than run.
    pub skipped: bool,
    /// Named output ports.
    outputs: HashMap<String, NodeOutput>,
    /// Branch semantics: when set, only these direct dependents are
    /// activated; every other dependent is skipped unconditionally.
    next_nodes: Option<HashSet<String>>,
    /// When the invocation started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the invocation finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeResult {
    /// A successful result with no outputs yet.
    #[must_use]
    pub fn success() -> Self {
        Self {
            node_id: String::new(),
            success: true,
            error: None,
            skipped: false,
            outputs: HashMap::new(),
            next_nodes: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// A failed result carrying a reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Self::success()
        }
    }

    /// A skipped result carrying a reason (also used for upstream failures;
    /// the distinguishing state lives in the executor's bookkeeping).
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: true,
            error: Some(reason.into()),
            ..Self::success()
        }
    }

    /// Stamp the owning node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Emit a payload on a named output port.
    #[must_use]
    pub fn with_output(mut self, port: impl Into<String>, output: impl Into<NodeOutput>) -> Self {
        self.outputs.insert(port.into(), output.into());
        self
    }

    /// Restrict which direct dependents get activated (branch semantics).
    #[must_use]
    pub fn with_next_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_nodes = Some(nodes.into_iter().map(Into::into).collect());
        self
    }

    /// Stamp the invocation timing.
    #[must_use]
    pub fn with_timing(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    /// The payload on a named output port, if any.
    #[must_use]
    pub fn output(&self, port: &str) -> Option<&NodeOutput> {
        self.outputs.get(port)
    }

    /// All named outputs.
    #[must_use]
    pub fn outputs(&self) -> &HashMap<String, NodeOutput> {
        &self.outputs
    }

    /// The explicit activation set, when this result carries one.
    #[must_use]
    pub fn next_nodes(&self) -> Option<&HashSet<String>> {
        self.next_nodes.as_ref().filter(|set| !set.is_empty())
    }

    /// The failure/skip reason, empty when none was recorded.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// Wall-clock duration of the invocation in milliseconds, if it ran.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

impl PartialEq for NodeResult {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for NodeResult {}

impl std::hash::Hash for NodeResult {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

/// The aggregate outcome of one flow execution.
///
/// `success` means the run reached exhaustion with no terminally failed or
/// cancelled node; a successful flow may still contain skipped or
/// upstream-failed nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    /// Unique id of this run.
    pub run_id: String,
    /// Overall success flag.
    pub success: bool,
    /// Nodes that finished in `Success`.
    pub succeeded: Vec<String>,
    /// Nodes resolved without running (`Skipped` / `UpstreamFailed`).
    pub skipped: Vec<String>,
    /// Terminally failed or cancelled nodes, with reasons.
    pub failed: HashMap<String, String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl FlowResult {
    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
