//! The `output` built-in.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::inputs::NodeInputs;
use crate::node::{RetryPolicy, TaskNode};
use crate::result::NodeResult;

/// Terminal collector: gathers everything wired into its default input port
/// and republishes it on the default output port. A single wired value
/// passes through unchanged; multiple values come out as an array.
#[derive(Debug, Clone)]
pub struct OutputNode {
    id: String,
}

impl OutputNode {
    /// Bind an output node to a graph node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl TaskNode for OutputNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "output"
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    async fn call(
        &self,
        _ctx: &ExecutionContext,
        inputs: NodeInputs,
    ) -> anyhow::Result<NodeResult> {
        let mut payloads: Vec<Value> = inputs
            .port(cascade_graph::DEFAULT_INPUT_PORT)
            .iter()
            .map(|output| output.payload.clone())
            .collect();
        let collected = match payloads.len() {
            0 => Value::Null,
            1 => payloads.remove(0),
            _ => Value::Array(payloads),
        };
        Ok(NodeResult::success().with_output(cascade_graph::DEFAULT_OUTPUT_PORT, collected))
    }
}
