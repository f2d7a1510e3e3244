use serde::{Deserialize, Serialize};

use adbrain_core::types::{NodeKind, NodeStatus};

/// How a generator's reply is read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the reply as-is.
    #[default]
    Text,
    /// The reply must contain a JSON object.
    Json,
}

/// Canvas position for the visual editor. Ignored by the executor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// A node in the workflow graph.
///
/// Declaration fields come from the graph descriptor; `status`, `output`
/// and `duration_secs` are written only by the executor during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the graph.
    pub id: String,
    pub kind: NodeKind,
    /// Human-readable name; generator labels become active agent names.
    pub label: String,
    /// Registered function: prompt builder, combiner, or assembler.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Campaign parameter that switches this generator off.
    #[serde(default)]
    pub toggle: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_secs: f64,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            function: None,
            output_format: OutputFormat::default(),
            toggle: None,
            position: Position::default(),
            status: NodeStatus::Idle,
            output: None,
            duration_secs: 0.0,
        }
    }

    pub fn trigger(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Trigger, label)
    }

    pub fn generator(
        id: impl Into<String>,
        label: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self::new(id, NodeKind::Generator, label).with_function(function)
    }

    pub fn aggregator(
        id: impl Into<String>,
        label: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self::new(id, NodeKind::Aggregator, label).with_function(function)
    }

    pub fn sink(id: impl Into<String>, label: impl Into<String>, function: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Sink, label).with_function(function)
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_toggle(mut self, toggle: impl Into<String>) -> Self {
        self.toggle = Some(toggle.into());
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Back to idle with no output.
    pub fn reset(&mut self) {
        self.status = NodeStatus::Idle;
        self.output = None;
        self.duration_secs = 0.0;
    }

    pub(crate) fn start(&mut self) {
        self.status = NodeStatus::Running;
    }

    pub(crate) fn finish(&mut self, status: NodeStatus, output: serde_json::Value, duration_secs: f64) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.output = Some(output);
        self.duration_secs = duration_secs;
    }

    /// Output, visible only once the node is terminal.
    pub fn output(&self) -> Option<&serde_json::Value> {
        if self.status.is_terminal() {
            self.output.as_ref()
        } else {
            None
        }
    }

    pub fn state(&self) -> NodeState {
        NodeState {
            id: self.id.clone(),
            label: self.label.clone(),
            kind: self.kind,
            status: self.status,
            duration_secs: self.duration_secs,
            output: self.output().cloned(),
        }
    }
}

/// Final state of one node, as kept in an execution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub duration_secs: f64,
    pub output: Option<serde_json::Value>,
}

impl NodeState {
    /// True for a generator whose toggle was off.
    pub fn is_skipped(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.get("status"))
            .and_then(|s| s.as_str())
            == Some("skipped")
    }
}
