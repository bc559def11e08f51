//! Materialized inputs handed to a node invocation.

use std::collections::HashMap;

use serde_json::Value;

use crate::result::NodeOutput;

/// The inputs wired into a node for one invocation, grouped by the node's
/// input port names.
///
/// A port can accumulate more than one value when several upstream outputs
/// are wired into it; values arrive in upstream completion order, which is
/// not deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    ports: HashMap<String, Vec<NodeOutput>>,
}

impl NodeInputs {
    /// Empty inputs, for root nodes and eager-fired nodes with nothing
    /// resolved yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to a port.
    pub fn push(&mut self, port: impl Into<String>, output: NodeOutput) {
        self.ports.entry(port.into()).or_default().push(output);
    }

    /// All values accumulated on a port.
    #[must_use]
    pub fn port(&self, port: &str) -> &[NodeOutput] {
        self.ports.get(port).map_or(&[], Vec::as_slice)
    }

    /// The first value on a port, the common single-wire case.
    #[must_use]
    pub fn first(&self, port: &str) -> Option<&NodeOutput> {
        self.port(port).first()
    }

    /// The first payload on a port.
    #[must_use]
    pub fn first_payload(&self, port: &str) -> Option<&Value> {
        self.first(port).map(|output| &output.payload)
    }

    /// Port names that received at least one value.
    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Returns `true` if nothing was wired in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
