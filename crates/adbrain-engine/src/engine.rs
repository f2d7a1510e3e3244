use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use adbrain_core::config::AppConfig;
use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::event::EventBus;
use adbrain_core::traits::{CampaignArchive, SignalSource};
use adbrain_core::types::{
    ArchivedCampaign, CampaignParams, ExecutionId, RunStatus, WorkflowEvent,
};
use adbrain_llm::{build_chain, ProviderChain};

use crate::context::{ContextSnapshot, ExecutionContext};
use crate::fallback::FallbackSynthesizer;
use crate::graph::{
    ExecutionRecord, GraphDescriptor, GraphExecutor, NodeState, Visualization, WorkflowGraph,
};
use crate::history::ExecutionHistory;
use crate::pipeline;
use crate::registry::NodeRegistry;
use crate::run_log::RunLogger;
use crate::signals::{build_signal_source, fetch_or_default, SimulatedSignals};

const LOGGER_GRACE: Duration = Duration::from_secs(5);

/// What happened to a run's result after it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ArchiveStatus {
    Archived(String),
    Failed(String),
    Disabled,
}

/// A finished run plus its archive outcome.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: Arc<ExecutionRecord>,
    pub archive: ArchiveStatus,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.record.status
    }
}

/// Execution count and the node states of the most recent run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStatus {
    pub graph_id: String,
    pub name: String,
    pub execution_count: usize,
    pub nodes: Vec<NodeState>,
}

/// Runs registered workflow graphs end to end: signals, execution,
/// fallback, archive, history.
pub struct WorkflowEngine {
    chain: Arc<ProviderChain>,
    registry: Arc<NodeRegistry>,
    signals: Arc<dyn SignalSource>,
    archive: Option<Arc<dyn CampaignArchive>>,
    event_bus: Arc<EventBus>,
    history: Arc<ExecutionHistory>,
    templates: HashMap<String, WorkflowGraph>,
    last_runs: Mutex<HashMap<String, WorkflowGraph>>,
    run_log: Option<(PathBuf, u8)>,
}

impl WorkflowEngine {
    /// An engine with the advertising pipeline registered.
    pub fn new(chain: Arc<ProviderChain>, event_bus: Arc<EventBus>) -> Result<Self> {
        let mut engine = Self {
            chain,
            registry: Arc::new(pipeline::registry()),
            signals: Arc::new(SimulatedSignals),
            archive: None,
            event_bus,
            history: Arc::new(ExecutionHistory::new()),
            templates: HashMap::new(),
            last_runs: Mutex::new(HashMap::new()),
            run_log: None,
        };
        engine.register_graph(&pipeline::advertising_pipeline())?;
        Ok(engine)
    }

    /// Build from configuration: provider chain, signal source, and run log.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::default());
        let chain = Arc::new(build_chain(config, Some(event_bus.clone())));
        let mut engine = Self::new(chain, event_bus)?.with_signals(build_signal_source(&config.signals));

        if let Some(log) = config.engine.log.as_ref().filter(|l| l.enabled) {
            engine.run_log = Some((config.log_dir(), log.level));
        }
        Ok(engine)
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalSource>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn CampaignArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_run_log(mut self, log_dir: PathBuf, level: u8) -> Self {
        self.run_log = Some((log_dir, level));
        self
    }

    /// Replace the function registry. Already registered graphs must
    /// still resolve against it.
    pub fn with_registry(mut self, registry: NodeRegistry) -> Result<Self> {
        for graph in self.templates.values() {
            for node in graph.nodes() {
                registry.check(node)?;
            }
        }
        self.registry = Arc::new(registry);
        Ok(self)
    }

    /// Register a graph template. Runs clone it, so concurrent runs never
    /// share node state.
    pub fn register_graph(&mut self, descriptor: &GraphDescriptor) -> Result<()> {
        let graph = WorkflowGraph::from_descriptor(descriptor)?;
        graph.validate()?;
        for node in graph.nodes() {
            self.registry.check(node)?;
        }
        info!(graph_id = %descriptor.id, nodes = graph.len(), "Registered workflow graph");
        self.templates.insert(descriptor.id.clone(), graph);
        Ok(())
    }

    pub fn graph_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn history(&self) -> Arc<ExecutionHistory> {
        self.history.clone()
    }

    pub fn recent(&self, n: usize) -> Vec<Arc<ExecutionRecord>> {
        self.history.recent(n)
    }

    pub async fn run(&self, graph_id: &str, params: CampaignParams) -> Result<RunOutcome> {
        self.run_with_cancel(graph_id, params, CancellationToken::new())
            .await
    }

    /// Run a graph. Cancellation is honored between node visits.
    ///
    /// Only structural errors are returned as `Err`; a structurally broken
    /// run still archives a synthesized fallback first.
    pub async fn run_with_cancel(
        &self,
        graph_id: &str,
        params: CampaignParams,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let template = self
            .templates
            .get(graph_id)
            .ok_or_else(|| AdbrainError::GraphNotFound(graph_id.to_string()))?;
        let mut graph = template.clone();
        let execution_id = ExecutionId::new();
        let logger = self.spawn_logger(&execution_id);
        let started = Utc::now();

        info!(execution_id = %execution_id, graph_id, topic = %params.topic, "Starting campaign run");
        self.event_bus.publish(WorkflowEvent::RunStarted {
            execution_id: execution_id.clone(),
            graph_id: graph_id.to_string(),
        });

        let signals = fetch_or_default(self.signals.as_ref(), &params.topic).await;
        let mut context = ExecutionContext::new(params.clone(), signals);
        let executor = GraphExecutor::new(self.chain.clone(), self.registry.clone())
            .with_event_bus(self.event_bus.clone());

        let result = executor
            .run_with(&mut graph, &mut context, execution_id.clone(), &cancel)
            .await;

        let mut record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Run aborted before execution");
                self.publish_fallback(&execution_id, &e.to_string());
                let fallback = FallbackSynthesizer::build(&params);
                self.archive_snapshot(&execution_id, graph_id, &fallback).await;
                self.finish(&execution_id, RunStatus::Error, started, logger).await;
                return Err(e);
            }
        };

        if let Some(reason) = fallback_reason(&record) {
            warn!(execution_id = %execution_id, reason, "Replacing run result with synthesized fallback");
            self.publish_fallback(&execution_id, reason);
            record = record.with_fallback(FallbackSynthesizer::build(&params));
        }

        let archive = self
            .archive_snapshot(&execution_id, graph_id, &record.context)
            .await;

        self.lock_last_runs().insert(graph_id.to_string(), graph);
        let record = Arc::new(record);
        self.history.record(record.clone());
        self.finish(&execution_id, record.status, started, logger).await;

        info!(
            execution_id = %execution_id,
            status = %record.status,
            fallback = record.fallback_used,
            elapsed_ms = record.elapsed_ms(),
            "Campaign run finished"
        );
        Ok(RunOutcome { record, archive })
    }

    /// Execution count plus the node states of the last run (idle if none).
    pub fn graph_status(&self, graph_id: &str) -> Result<GraphStatus> {
        let template = self
            .templates
            .get(graph_id)
            .ok_or_else(|| AdbrainError::GraphNotFound(graph_id.to_string()))?;
        let nodes = self
            .lock_last_runs()
            .get(graph_id)
            .map(|g| g.node_states())
            .unwrap_or_else(|| template.node_states());

        Ok(GraphStatus {
            graph_id: graph_id.to_string(),
            name: template.name().to_string(),
            execution_count: self.history.count_for(graph_id),
            nodes,
        })
    }

    pub fn visualization(&self, graph_id: &str) -> Result<Visualization> {
        let template = self
            .templates
            .get(graph_id)
            .ok_or_else(|| AdbrainError::GraphNotFound(graph_id.to_string()))?;
        Ok(self
            .lock_last_runs()
            .get(graph_id)
            .map(|g| g.visualization())
            .unwrap_or_else(|| template.visualization()))
    }

    pub fn descriptor(&self, graph_id: &str) -> Result<GraphDescriptor> {
        self.templates
            .get(graph_id)
            .map(|g| g.descriptor())
            .ok_or_else(|| AdbrainError::GraphNotFound(graph_id.to_string()))
    }

    fn spawn_logger(&self, execution_id: &ExecutionId) -> Option<(JoinHandle<()>, CancellationToken)> {
        let (dir, level) = self.run_log.clone()?;
        let cancel = CancellationToken::new();
        let rx = self.event_bus.subscribe();
        let handle = tokio::spawn(RunLogger::new(dir, level).run(
            rx,
            execution_id.clone(),
            cancel.clone(),
        ));
        Some((handle, cancel))
    }

    async fn finish(
        &self,
        execution_id: &ExecutionId,
        status: RunStatus,
        started: chrono::DateTime<Utc>,
        logger: Option<(JoinHandle<()>, CancellationToken)>,
    ) {
        self.event_bus.publish(WorkflowEvent::RunCompleted {
            execution_id: execution_id.clone(),
            status,
            elapsed_ms: (Utc::now() - started).num_milliseconds().max(0) as u64,
        });
        if let Some((mut handle, cancel)) = logger {
            // The logger exits on RunCompleted; a lagged receiver may miss it
            if tokio::time::timeout(LOGGER_GRACE, &mut handle).await.is_err() {
                warn!(execution_id = %execution_id, "Run logger did not finish, cancelling");
                cancel.cancel();
                handle.await.ok();
            }
        }
    }

    fn publish_fallback(&self, execution_id: &ExecutionId, reason: &str) {
        self.event_bus.publish(WorkflowEvent::FallbackSynthesized {
            execution_id: execution_id.clone(),
            reason: reason.to_string(),
        });
    }

    async fn archive_snapshot(
        &self,
        execution_id: &ExecutionId,
        graph_id: &str,
        snapshot: &ContextSnapshot,
    ) -> ArchiveStatus {
        let Some(archive) = &self.archive else {
            return ArchiveStatus::Disabled;
        };

        let campaign = ArchivedCampaign {
            execution_id: execution_id.to_string(),
            graph_id: graph_id.to_string(),
            topic: snapshot.params.topic.clone(),
            brand: snapshot.params.brand.clone(),
            budget: snapshot.params.budget,
            market_region: snapshot.params.market_region.clone(),
            synthesized: snapshot.synthesized,
            snapshot: snapshot.to_value(),
            archived_at: Utc::now(),
        };

        match archive.archive(campaign).await {
            Ok(campaign_id) => {
                info!(execution_id = %execution_id, campaign_id = %campaign_id, "Campaign archived");
                self.event_bus.publish(WorkflowEvent::Archived {
                    execution_id: execution_id.clone(),
                    campaign_id: campaign_id.clone(),
                });
                ArchiveStatus::Archived(campaign_id)
            }
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Failed to archive campaign");
                self.event_bus.publish(WorkflowEvent::ArchiveFailed {
                    execution_id: execution_id.clone(),
                    error: e.to_string(),
                });
                ArchiveStatus::Failed(e.to_string())
            }
        }
    }

    fn lock_last_runs(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorkflowGraph>> {
        self.last_runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Why a finished run needs a synthesized result, if it does.
fn fallback_reason(record: &ExecutionRecord) -> Option<&'static str> {
    if record.all_generators_failed() {
        Some("every generator failed")
    } else if record.context.blueprint.is_some() {
        None
    } else if record.cancelled {
        Some("run cancelled before the blueprint was assembled")
    } else {
        Some("no blueprint was produced")
    }
}
