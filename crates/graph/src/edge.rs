//! Workflow graph edge.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};

/// A directed dependency edge between two nodes, carrying the port wiring.
///
/// `source_port` and `target_port` default to the single well-known port
/// names when the wire format omits them (or sends them as empty strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Unique edge identifier.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Output port on the source node.
    #[serde(
        alias = "sourceHandle",
        alias = "source_handle",
        alias = "sourcePort",
        default = "default_output_port",
        deserialize_with = "port_or_output"
    )]
    pub source_port: String,
    /// Input port on the target node.
    #[serde(
        alias = "targetHandle",
        alias = "target_handle",
        alias = "targetPort",
        default = "default_input_port",
        deserialize_with = "port_or_input"
    )]
    pub target_port: String,
}

fn default_output_port() -> String {
    DEFAULT_OUTPUT_PORT.to_owned()
}

fn default_input_port() -> String {
    DEFAULT_INPUT_PORT.to_owned()
}

fn port_or_output<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let port: Option<String> = Option::deserialize(d)?;
    Ok(port.filter(|p| !p.is_empty()).unwrap_or_else(default_output_port))
}

fn port_or_input<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let port: Option<String> = Option::deserialize(d)?;
    Ok(port.filter(|p| !p.is_empty()).unwrap_or_else(default_input_port))
}

impl GraphEdge {
    /// Create an edge on the default ports.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_port: default_output_port(),
            target_port: default_input_port(),
        }
    }

    /// Set both the source output port and the target input port.
    #[must_use]
    pub fn with_ports(mut self, source_port: impl Into<String>, target_port: impl Into<String>) -> Self {
        self.source_port = source_port.into();
        self.target_port = target_port.into();
        self
    }

    /// Returns `true` if the edge carries usable id and endpoint references.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
            && !self.source.trim().is_empty()
            && !self.target.trim().is_empty()
    }
}
