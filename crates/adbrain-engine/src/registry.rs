use std::collections::HashMap;
use std::sync::Arc;

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::types::NodeKind;

use crate::context::ExecutionContext;
use crate::graph::WorkflowNode;

/// Builds a generator prompt from the current context.
pub type PromptBuilder = Arc<dyn Fn(&ExecutionContext) -> String + Send + Sync>;
/// Pure aggregation over the context.
pub type Combiner = Arc<dyn Fn(&ExecutionContext) -> Result<Aggregate> + Send + Sync>;
/// Assembles the terminal deliverable from the full context.
pub type Assembler = Arc<dyn Fn(&ExecutionContext) -> Result<TerminalArtifacts> + Send + Sync>;

/// Output of an aggregator: a value plus named metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub output: serde_json::Value,
    pub metrics: Vec<(String, f64)>,
}

impl Aggregate {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.push((key.into(), value));
        self
    }
}

/// What a sink produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalArtifacts {
    pub blueprint: serde_json::Value,
    pub deployment_commands: Vec<serde_json::Value>,
}

/// Named pure functions that graph nodes refer to.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    prompts: HashMap<String, PromptBuilder>,
    combiners: HashMap<String, Combiner>,
    assemblers: HashMap<String, Assembler>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_prompt<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&ExecutionContext) -> String + Send + Sync + 'static,
    {
        self.prompts.insert(name.to_string(), Arc::new(f));
    }

    pub fn register_combiner<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&ExecutionContext) -> Result<Aggregate> + Send + Sync + 'static,
    {
        self.combiners.insert(name.to_string(), Arc::new(f));
    }

    pub fn register_assembler<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&ExecutionContext) -> Result<TerminalArtifacts> + Send + Sync + 'static,
    {
        self.assemblers.insert(name.to_string(), Arc::new(f));
    }

    pub fn prompt(&self, name: &str) -> Option<PromptBuilder> {
        self.prompts.get(name).cloned()
    }

    pub fn combiner(&self, name: &str) -> Option<Combiner> {
        self.combiners.get(name).cloned()
    }

    pub fn assembler(&self, name: &str) -> Option<Assembler> {
        self.assemblers.get(name).cloned()
    }

    /// Check that a node's function is registered for its kind.
    pub fn check(&self, node: &WorkflowNode) -> Result<()> {
        if node.kind == NodeKind::Trigger {
            return Ok(());
        }
        let Some(function) = node.function.as_deref() else {
            return Err(AdbrainError::InvalidGraph(format!(
                "{} node '{}' names no function",
                node.kind, node.id
            )));
        };
        let registered = match node.kind {
            NodeKind::Generator => self.prompts.contains_key(function),
            NodeKind::Aggregator => self.combiners.contains_key(function),
            NodeKind::Sink => self.assemblers.contains_key(function),
            NodeKind::Trigger => true,
        };
        if registered {
            Ok(())
        } else {
            Err(AdbrainError::InvalidGraph(format!(
                "{} node '{}' refers to unregistered function '{}'",
                node.kind, node.id, function
            )))
        }
    }
}
