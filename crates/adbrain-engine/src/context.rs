use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use adbrain_core::types::{CampaignParams, MarketSignals};

use crate::registry::TerminalArtifacts;

/// Per-run state threaded through every node.
///
/// Created once per run and passed by `&mut`. Parameters are fixed at
/// construction; lists only grow, and scalar entries are overwritten.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    params: CampaignParams,
    market_signals: MarketSignals,
    results: BTreeMap<String, serde_json::Value>,
    active_agents: Vec<String>,
    metrics: BTreeMap<String, f64>,
    providers_used: BTreeMap<String, String>,
    blueprint: Option<serde_json::Value>,
    deployment_commands: Vec<serde_json::Value>,
}

impl ExecutionContext {
    pub fn new(params: CampaignParams, market_signals: MarketSignals) -> Self {
        Self {
            params,
            market_signals,
            results: BTreeMap::new(),
            active_agents: Vec::new(),
            metrics: BTreeMap::new(),
            providers_used: BTreeMap::new(),
            blueprint: None,
            deployment_commands: Vec::new(),
        }
    }

    pub fn params(&self) -> &CampaignParams {
        &self.params
    }

    pub fn market_signals(&self) -> &MarketSignals {
        &self.market_signals
    }

    pub fn result(&self, node_id: &str) -> Option<&serde_json::Value> {
        self.results.get(node_id)
    }

    /// A node result as text, `None` when the node errored or was skipped.
    pub fn result_text(&self, node_id: &str) -> Option<String> {
        let value = self.results.get(node_id)?;
        if value.get("error").is_some() || value.get("status").and_then(|s| s.as_str()) == Some("skipped") {
            return None;
        }
        Some(match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn results(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.results
    }

    pub fn record_result(&mut self, node_id: &str, output: serde_json::Value) {
        self.results.insert(node_id.to_string(), output);
    }

    pub fn active_agents(&self) -> &[String] {
        &self.active_agents
    }

    pub fn push_agent(&mut self, label: &str) {
        self.active_agents.push(label.to_string());
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn set_metric(&mut self, key: impl Into<String>, value: f64) {
        self.metrics.insert(key.into(), value);
    }

    pub fn providers_used(&self) -> &BTreeMap<String, String> {
        &self.providers_used
    }

    pub fn record_provider(&mut self, node_id: &str, provider: &str) {
        self.providers_used
            .insert(node_id.to_string(), provider.to_string());
    }

    pub fn blueprint(&self) -> Option<&serde_json::Value> {
        self.blueprint.as_ref()
    }

    pub fn deployment_commands(&self) -> &[serde_json::Value] {
        &self.deployment_commands
    }

    /// Only sink nodes write terminal artifacts.
    pub(crate) fn set_terminal(&mut self, artifacts: TerminalArtifacts) {
        self.blueprint = Some(artifacts.blueprint);
        self.deployment_commands.extend(artifacts.deployment_commands);
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            params: self.params.clone(),
            market_signals: self.market_signals.clone(),
            results: self.results.clone(),
            active_agents: self.active_agents.clone(),
            metrics: self.metrics.clone(),
            providers_used: self.providers_used.clone(),
            blueprint: self.blueprint.clone(),
            deployment_commands: self.deployment_commands.clone(),
            synthesized: false,
        }
    }
}

/// Immutable copy of a context, as stored in records and the archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    pub params: CampaignParams,
    pub market_signals: MarketSignals,
    pub results: BTreeMap<String, serde_json::Value>,
    pub active_agents: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub providers_used: BTreeMap<String, String>,
    pub blueprint: Option<serde_json::Value>,
    pub deployment_commands: Vec<serde_json::Value>,
    /// True for placeholder content built without running the pipeline.
    #[serde(default)]
    pub synthesized: bool,
}

impl ContextSnapshot {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
