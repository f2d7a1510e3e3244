use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::event::EventBus;
use adbrain_core::types::{ExecutionId, NodeKind, NodeStatus, RunStatus, WorkflowEvent};
use adbrain_llm::ProviderChain;

use super::node::{NodeState, OutputFormat, WorkflowNode};
use super::WorkflowGraph;
use crate::context::{ContextSnapshot, ExecutionContext};
use crate::registry::NodeRegistry;

/// Everything known about one finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub graph_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Per-node final states, in graph declaration order.
    pub node_states: Vec<NodeState>,
    pub context: ContextSnapshot,
    pub cancelled: bool,
    pub fallback_used: bool,
}

impl ExecutionRecord {
    pub fn elapsed_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn node_state(&self, id: &str) -> Option<&NodeState> {
        self.node_states.iter().find(|n| n.id == id)
    }

    /// True when at least one generator ran and every one that ran errored.
    pub fn all_generators_failed(&self) -> bool {
        let ran: Vec<_> = self
            .node_states
            .iter()
            .filter(|n| n.kind == NodeKind::Generator && n.status.is_terminal() && !n.is_skipped())
            .collect();
        !ran.is_empty() && ran.iter().all(|n| n.status == NodeStatus::Error)
    }

    /// Replace the context with a synthesized one.
    pub fn with_fallback(mut self, snapshot: ContextSnapshot) -> Self {
        self.context = snapshot;
        self.fallback_used = true;
        self
    }
}

/// Walks a workflow graph depth-first from its trigger.
///
/// Each node runs exactly once per run, and only after all of its
/// predecessors are terminal. Node failures are recorded and the walk
/// continues; only structural problems abort a run.
pub struct GraphExecutor {
    chain: Arc<ProviderChain>,
    registry: Arc<NodeRegistry>,
    event_bus: Option<Arc<EventBus>>,
}

impl GraphExecutor {
    pub fn new(chain: Arc<ProviderChain>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            chain,
            registry,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Run a graph to completion with a fresh execution id.
    pub async fn run(
        &self,
        graph: &mut WorkflowGraph,
        context: &mut ExecutionContext,
    ) -> Result<ExecutionRecord> {
        self.run_with(graph, context, ExecutionId::new(), &CancellationToken::new())
            .await
    }

    /// Run a graph, checking `cancel` between node visits.
    pub async fn run_with(
        &self,
        graph: &mut WorkflowGraph,
        context: &mut ExecutionContext,
        execution_id: ExecutionId,
        cancel: &CancellationToken,
    ) -> Result<ExecutionRecord> {
        self.preflight(graph)?;
        graph.reset();

        let started_at = Utc::now();
        let mut visited = vec![false; graph.len()];
        let mut any_failed = false;
        let mut cancelled = false;

        // Reverse so the first successor is popped first
        let mut stack: Vec<usize> = graph.trigger_indices().into_iter().rev().collect();

        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            let ready = graph
                .predecessor_indices(idx)
                .into_iter()
                .all(|p| graph.node_at(p).status.is_terminal());
            if !ready {
                // The last predecessor to finish pushes it again
                debug!(node_id = %graph.node_at(idx).id, "Deferring node until inputs are ready");
                continue;
            }
            if cancel.is_cancelled() {
                warn!(execution_id = %execution_id, "Run cancelled, stopping traversal");
                cancelled = true;
                break;
            }

            visited[idx] = true;
            if !self.execute_node(graph, idx, context, &execution_id).await {
                any_failed = true;
            }

            for succ in graph.successor_indices(idx).into_iter().rev() {
                if !visited[succ] {
                    stack.push(succ);
                }
            }
        }

        let status = if any_failed || cancelled {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };

        Ok(ExecutionRecord {
            execution_id,
            graph_id: graph.id().to_string(),
            started_at,
            finished_at: Utc::now(),
            status,
            node_states: graph.node_states(),
            context: context.snapshot(),
            cancelled,
            fallback_used: false,
        })
    }

    /// Structural checks; nothing runs if these fail.
    fn preflight(&self, graph: &WorkflowGraph) -> Result<()> {
        graph.validate()?;
        for node in graph.nodes() {
            self.registry.check(node)?;
        }
        Ok(())
    }

    /// Execute one node. Returns false if the node ended in error.
    async fn execute_node(
        &self,
        graph: &mut WorkflowGraph,
        idx: usize,
        context: &mut ExecutionContext,
        execution_id: &ExecutionId,
    ) -> bool {
        let node = graph.node_at_mut(idx);
        node.start();
        let spec = node.clone();
        let node_id = spec.id.clone();
        let kind = spec.kind;
        let function = spec.function.clone().unwrap_or_default();

        info!(node_id = %node_id, kind = %kind, "Executing workflow node");
        self.publish(WorkflowEvent::NodeStarted {
            execution_id: execution_id.clone(),
            node_id: node_id.clone(),
            kind,
        });

        let start = Instant::now();
        let result = match kind {
            NodeKind::Trigger => Ok(context.params().to_value()),
            NodeKind::Generator => {
                self.run_generator(&spec, &function, execution_id, context)
                    .await
            }
            NodeKind::Aggregator => self.run_aggregator(&node_id, &function, context),
            NodeKind::Sink => self.run_sink(&node_id, &function, context),
        };
        let duration_secs = start.elapsed().as_secs_f64();
        context.set_metric(format!("{}_time", node_id), duration_secs);

        let node = graph.node_at_mut(idx);
        match result {
            Ok(output) => {
                context.record_result(&node_id, output.clone());
                node.finish(NodeStatus::Completed, output, duration_secs);
                debug!(node_id = %node_id, duration_secs, "Node completed");
                self.publish(WorkflowEvent::NodeCompleted {
                    execution_id: execution_id.clone(),
                    node_id,
                    duration_secs,
                });
                true
            }
            Err(e) => {
                let message = e.to_string();
                error!(node_id = %node_id, error = %message, "Workflow node failed");
                let output = serde_json::json!({ "error": message });
                context.record_result(&node_id, output.clone());
                node.finish(NodeStatus::Error, output, duration_secs);
                self.publish(WorkflowEvent::NodeFailed {
                    execution_id: execution_id.clone(),
                    node_id,
                    error: message,
                });
                false
            }
        }
    }

    async fn run_generator(
        &self,
        node: &WorkflowNode,
        function: &str,
        execution_id: &ExecutionId,
        context: &mut ExecutionContext,
    ) -> Result<serde_json::Value> {
        let node_id = node.id.as_str();
        if let Some(toggle) = node.toggle.as_deref() {
            if !context.params().toggle(toggle) {
                info!(node_id, toggle, "Generator switched off, skipping");
                return Ok(serde_json::json!({ "status": "skipped" }));
            }
        }

        let builder = self
            .registry
            .prompt(function)
            .ok_or_else(|| AdbrainError::InvalidGraph(format!("unregistered prompt '{}'", function)))?;
        let prompt = builder(&*context);

        let reply = self.chain.invoke_for(&prompt, execution_id).await;
        let Some(provider) = reply.provider_used.as_deref() else {
            return Err(AdbrainError::NodeExecution {
                node: node_id.to_string(),
                message: format!("all providers failed: {}", reply.text()),
            });
        };

        let output = match node.output_format {
            OutputFormat::Text => reply.output.clone(),
            OutputFormat::Json => parse_json_object(&reply.output)?,
        };

        context.record_provider(node_id, provider);
        context.push_agent(&node.label);
        Ok(output)
    }

    fn run_aggregator(
        &self,
        node_id: &str,
        function: &str,
        context: &mut ExecutionContext,
    ) -> Result<serde_json::Value> {
        let combiner = self.registry.combiner(function).ok_or_else(|| {
            AdbrainError::InvalidGraph(format!("unregistered combiner '{}'", function))
        })?;
        let aggregate = combiner(&*context).map_err(|e| AdbrainError::NodeExecution {
            node: node_id.to_string(),
            message: e.to_string(),
        })?;
        for (key, value) in aggregate.metrics {
            context.set_metric(key, value);
        }
        Ok(aggregate.output)
    }

    fn run_sink(
        &self,
        node_id: &str,
        function: &str,
        context: &mut ExecutionContext,
    ) -> Result<serde_json::Value> {
        let assembler = self.registry.assembler(function).ok_or_else(|| {
            AdbrainError::InvalidGraph(format!("unregistered assembler '{}'", function))
        })?;
        let artifacts = assembler(&*context).map_err(|e| AdbrainError::NodeExecution {
            node: node_id.to_string(),
            message: e.to_string(),
        })?;
        let output = serde_json::json!({
            "blueprint": artifacts.blueprint,
            "deployment_commands": artifacts.deployment_commands,
        });
        context.set_terminal(artifacts);
        Ok(output)
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Read a provider reply as a JSON object.
///
/// Accepts an object as-is, or text holding one, optionally inside a
/// markdown code fence or surrounded by prose.
pub(crate) fn parse_json_object(value: &serde_json::Value) -> Result<serde_json::Value> {
    let text = match value {
        serde_json::Value::Object(_) => return Ok(value.clone()),
        serde_json::Value::String(s) => s.as_str(),
        other => {
            return Err(AdbrainError::Parse(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };

    let body = fence_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    if let Ok(parsed @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(body) {
        return Ok(parsed);
    }
    // Prose around the object
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(parsed @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(&body[start..=end]) {
                return Ok(parsed);
            }
        }
    }

    let preview: String = text.chars().take(80).collect();
    Err(AdbrainError::Parse(format!(
        "reply is not a JSON object: {}",
        preview
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowNode;
    use crate::registry::{Aggregate, TerminalArtifacts};
    use adbrain_core::types::{CampaignParams, MarketSignals};
    use adbrain_llm::ProviderDescriptor;
    use adbrain_test_utils::{CallCounter, ScriptedProvider, StaticProvider};

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            CampaignParams::new("sustainable fashion", "EcoWear"),
            MarketSignals::default(),
        )
    }

    fn chain_of(text: &str) -> Arc<ProviderChain> {
        Arc::new(ProviderChain::new().with_provider(ProviderDescriptor::new(
            Arc::new(StaticProvider::new("gemini", text)),
            0,
        )))
    }

    /// start → a, start → b, a → join, b → join
    fn diamond(counter: &CallCounter) -> (WorkflowGraph, NodeRegistry) {
        let mut g = WorkflowGraph::new("diamond", "Diamond");
        g.add_node(WorkflowNode::trigger("start", "Start")).unwrap();
        g.add_node(WorkflowNode::generator("a", "AgentA", "prompt_a")).unwrap();
        g.add_node(WorkflowNode::aggregator("b", "B", "combine_b")).unwrap();
        g.add_node(WorkflowNode::aggregator("join", "Join", "combine_join")).unwrap();
        g.connect("start", "a").unwrap();
        g.connect("start", "b").unwrap();
        g.connect("a", "join").unwrap();
        g.connect("b", "join").unwrap();

        let mut registry = NodeRegistry::new();
        registry.register_prompt("prompt_a", |ctx| format!("Write about {}", ctx.params().topic));
        registry.register_combiner("combine_b", |_| {
            Ok(Aggregate::new(serde_json::json!({"b": true})).with_metric("b_score", 2.0))
        });
        let c = counter.clone();
        registry.register_combiner("combine_join", move |ctx| {
            c.hit();
            let a = ctx.result("a").cloned().unwrap_or_default();
            let b = ctx.result("b").cloned().unwrap_or_default();
            Ok(Aggregate::new(serde_json::json!({"a": a, "b": b})))
        });
        (g, registry)
    }

    #[tokio::test]
    async fn test_join_runs_exactly_once() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let executor = GraphExecutor::new(chain_of("generated"), Arc::new(registry));
        let mut ctx = context();

        let record = executor.run(&mut graph, &mut ctx).await.unwrap();
        assert_eq!(counter.count(), 1);
        assert_eq!(record.status, RunStatus::Completed);

        // The join saw both inputs
        let join = record.node_state("join").unwrap();
        assert_eq!(join.output.as_ref().unwrap()["a"], "generated");
        assert_eq!(join.output.as_ref().unwrap()["b"]["b"], true);
        assert_eq!(ctx.metric("b_score"), Some(2.0));
        assert!(ctx.metric("join_time").is_some());
    }

    #[tokio::test]
    async fn test_trigger_output_is_params() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let executor = GraphExecutor::new(chain_of("x"), Arc::new(registry));
        let mut ctx = context();
        executor.run(&mut graph, &mut ctx).await.unwrap();

        let start = graph.node("start").unwrap();
        assert_eq!(start.status, NodeStatus::Completed);
        assert_eq!(start.output().unwrap()["brand"], "EcoWear");
        assert_eq!(ctx.active_agents(), &["AgentA".to_string()]);
        assert_eq!(ctx.providers_used()["a"], "gemini");
    }

    #[tokio::test]
    async fn test_provider_exhaustion_marks_node_error_and_continues() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let executor = GraphExecutor::new(chain_of("Error: quota exceeded"), Arc::new(registry));
        let mut ctx = context();

        let record = executor.run(&mut graph, &mut ctx).await.unwrap();
        assert_eq!(record.status, RunStatus::Error);
        let a = record.node_state("a").unwrap();
        assert_eq!(a.status, NodeStatus::Error);
        assert!(a.output.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("Error: quota exceeded"));
        // Successors still visited
        assert_eq!(record.node_state("join").unwrap().status, NodeStatus::Completed);
        assert_eq!(counter.count(), 1);
        assert!(ctx.active_agents().is_empty());
        assert!(record.all_generators_failed());
    }

    #[tokio::test]
    async fn test_structural_error_aborts_before_any_node() {
        let counter = CallCounter::new();
        let (mut graph, _) = diamond(&counter);
        let executor = GraphExecutor::new(chain_of("x"), Arc::new(NodeRegistry::new()));
        let mut ctx = context();

        let err = executor.run(&mut graph, &mut ctx).await.unwrap_err();
        assert!(err.is_structural());
        assert!(graph.nodes().iter().all(|n| n.status == NodeStatus::Idle));
        assert!(ctx.results().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_leaves_nodes_idle() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let executor = GraphExecutor::new(chain_of("x"), Arc::new(registry));
        let mut ctx = context();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let record = executor
            .run_with(&mut graph, &mut ctx, ExecutionId::new(), &cancel)
            .await
            .unwrap();
        assert!(record.cancelled);
        assert_eq!(record.status, RunStatus::Error);
        assert!(record.node_states.iter().all(|n| n.status == NodeStatus::Idle));
    }

    #[tokio::test]
    async fn test_toggle_skips_generator() {
        let mut g = WorkflowGraph::new("g", "G");
        g.add_node(WorkflowNode::trigger("start", "Start")).unwrap();
        g.add_node(
            WorkflowNode::generator("budget", "BudgetOptimizer", "budget_prompt")
                .with_toggle("include_budget"),
        )
        .unwrap();
        g.connect("start", "budget").unwrap();

        let mut registry = NodeRegistry::new();
        registry.register_prompt("budget_prompt", |_| "Allocate budget".into());
        let provider = Arc::new(StaticProvider::new("gemini", "40% social"));
        let chain = ProviderChain::new().with_provider(ProviderDescriptor::new(provider.clone(), 0));
        let executor = GraphExecutor::new(Arc::new(chain), Arc::new(registry));

        let mut params = CampaignParams::new("t", "b");
        params.include_budget = false;
        let mut ctx = ExecutionContext::new(params, MarketSignals::default());
        let record = executor.run(&mut g, &mut ctx).await.unwrap();

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(ctx.result("budget").unwrap()["status"], "skipped");
        assert!(ctx.active_agents().is_empty());
        assert_eq!(provider.calls(), 0);
        assert!(!record.all_generators_failed());
    }

    #[tokio::test]
    async fn test_json_generator_parse_failure() {
        let mut g = WorkflowGraph::new("g", "G");
        g.add_node(WorkflowNode::trigger("start", "Start")).unwrap();
        g.add_node(
            WorkflowNode::generator("creative", "CreativeSynthesizer", "creative_prompt")
                .with_format(OutputFormat::Json),
        )
        .unwrap();
        g.connect("start", "creative").unwrap();
        let mut registry = NodeRegistry::new();
        registry.register_prompt("creative_prompt", |_| "Create".into());

        let executor = GraphExecutor::new(chain_of("Here are three headlines"), Arc::new(registry));
        let mut ctx = context();
        let record = executor.run(&mut g, &mut ctx).await.unwrap();

        let creative = record.node_state("creative").unwrap();
        assert_eq!(creative.status, NodeStatus::Error);
        assert!(creative.output.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .starts_with("Response parse error"));
        assert!(ctx.active_agents().is_empty());
    }

    #[tokio::test]
    async fn test_sink_writes_terminal_artifacts() {
        let mut g = WorkflowGraph::new("g", "G");
        g.add_node(WorkflowNode::trigger("start", "Start")).unwrap();
        g.add_node(WorkflowNode::sink("deploy", "Deploy", "assemble")).unwrap();
        g.connect("start", "deploy").unwrap();
        let mut registry = NodeRegistry::new();
        registry.register_assembler("assemble", |ctx| {
            Ok(TerminalArtifacts {
                blueprint: serde_json::json!({"brand": ctx.params().brand}),
                deployment_commands: vec![serde_json::json!({"action": "launch"})],
            })
        });

        let executor = GraphExecutor::new(chain_of("x"), Arc::new(registry));
        let mut ctx = context();
        executor.run(&mut g, &mut ctx).await.unwrap();
        assert_eq!(ctx.blueprint().unwrap()["brand"], "EcoWear");
        assert_eq!(ctx.deployment_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_node_events_published() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor =
            GraphExecutor::new(chain_of("x"), Arc::new(registry)).with_event_bus(bus.clone());
        let mut ctx = context();
        executor.run(&mut graph, &mut ctx).await.unwrap();

        let mut started = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::NodeStarted { node_id, .. } = event {
                started.push(node_id);
            }
        }
        assert_eq!(started, vec!["start", "a", "b", "join"]);
    }

    #[tokio::test]
    async fn test_rerun_resets_node_state() {
        let counter = CallCounter::new();
        let (mut graph, registry) = diamond(&counter);
        let provider = Arc::new(ScriptedProvider::new("gemini", vec!["Error: down".into(), "up".into()]));
        let chain = ProviderChain::new().with_provider(ProviderDescriptor::new(provider, 0));
        let executor = GraphExecutor::new(Arc::new(chain), Arc::new(registry));

        let first = executor.run(&mut graph, &mut context()).await.unwrap();
        assert_eq!(first.status, RunStatus::Error);
        let second = executor.run(&mut graph, &mut context()).await.unwrap();
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_parse_json_object_variants() {
        let fenced = serde_json::json!("```json\n{\"headline\": \"Wear the Change\"}\n```");
        assert_eq!(parse_json_object(&fenced).unwrap()["headline"], "Wear the Change");

        let prose = serde_json::json!("Sure! Here it is: {\"a\": 1} Hope this helps.");
        assert_eq!(parse_json_object(&prose).unwrap()["a"], 1);

        let object = serde_json::json!({"a": 2});
        assert_eq!(parse_json_object(&object).unwrap()["a"], 2);

        assert!(parse_json_object(&serde_json::json!("[1, 2]")).is_err());
        assert!(parse_json_object(&serde_json::json!(42)).is_err());
        assert!(parse_json_object(&serde_json::json!("no json")).is_err());
    }
}
