use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of work a workflow node performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    Generator,
    Aggregator,
    Sink,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Generator => "generator",
            Self::Aggregator => "aggregator",
            Self::Sink => "sink",
        };
        f.write_str(s)
    }
}

/// Node status lifecycle: idle → running → completed | error.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Campaign parameters supplied by the caller when a run is started.
///
/// Named fields cover what the pipeline reads directly; anything else the
/// caller passes is kept in `extra` and travels with the parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignParams {
    pub topic: String,
    pub brand: String,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default = "default_market_region")]
    pub market_region: String,
    #[serde(default = "empty_object")]
    pub user_profile: serde_json::Value,
    #[serde(default = "default_true")]
    pub include_budget: bool,
    #[serde(default = "default_true")]
    pub include_personalization: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_budget() -> f64 {
    10_000.0
}

fn default_market_region() -> String {
    "Global".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

fn default_true() -> bool {
    true
}

impl CampaignParams {
    pub fn new(topic: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            brand: brand.into(),
            budget: default_budget(),
            market_region: default_market_region(),
            user_profile: empty_object(),
            include_budget: true,
            include_personalization: true,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.market_region = region.into();
        self
    }

    pub fn with_profile(mut self, profile: serde_json::Value) -> Self {
        self.user_profile = profile;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up a feature toggle by name. Unknown toggles are on.
    pub fn toggle(&self, name: &str) -> bool {
        match name {
            "include_budget" => self.include_budget,
            "include_personalization" => self.include_personalization,
            other => self
                .extra
                .get(other)
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        }
    }

    /// The parameters as a flat JSON object.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| empty_object())
    }
}

/// Market signals for a topic, each sub-signal pre-normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSignals {
    /// Social engagement momentum, 0-10.
    pub social_momentum: f64,
    /// News coverage relevance, 0-10.
    pub news_relevance: f64,
    /// Topic novelty, 0-1.
    pub novelty: f64,
    /// Cultural relevance of the topic, 0-10.
    pub relevance_score: f64,
    /// Raw payload from the data provider, if any.
    #[serde(default)]
    pub sources: serde_json::Value,
}

impl Default for MarketSignals {
    fn default() -> Self {
        Self {
            social_momentum: 5.0,
            news_relevance: 5.0,
            novelty: 0.5,
            relevance_score: 8.0,
            sources: serde_json::Value::Null,
        }
    }
}

/// Why a provider reply was unusable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No credential or configuration.
    Unavailable,
    /// Transport error or non-success response.
    Transport,
    /// The per-call timeout elapsed.
    Timeout,
    /// The reply contained a configured failure sentinel.
    Sentinel,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Sentinel => "sentinel",
        };
        f.write_str(s)
    }
}

/// Tagged result returned by every generation provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    Ok(serde_json::Value),
    Failure { kind: FailureKind, message: String },
}

impl ProviderReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Ok(serde_json::Value::String(text.into()))
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::failure(FailureKind::Unavailable, message)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// The immutable record handed to the storage collaborator after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedCampaign {
    pub execution_id: String,
    pub graph_id: String,
    pub topic: String,
    pub brand: String,
    pub budget: f64,
    pub market_region: String,
    /// True when the snapshot is synthesized placeholder content.
    pub synthesized: bool,
    pub snapshot: serde_json::Value,
    pub archived_at: DateTime<Utc>,
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A run was accepted and is about to execute.
    RunStarted { execution_id: ExecutionId, graph_id: String },
    /// A node moved to running.
    NodeStarted { execution_id: ExecutionId, node_id: String, kind: NodeKind },
    /// A node completed.
    NodeCompleted { execution_id: ExecutionId, node_id: String, duration_secs: f64 },
    /// A node errored; the run continues.
    NodeFailed { execution_id: ExecutionId, node_id: String, error: String },
    /// A provider in the chain returned an unusable reply. `execution_id` is
    /// `None` when the chain was invoked outside a run.
    ProviderFailed {
        execution_id: Option<ExecutionId>,
        provider: String,
        kind: FailureKind,
        message: String,
    },
    /// A provider in the chain returned a usable reply.
    ProviderSelected {
        execution_id: Option<ExecutionId>,
        provider: String,
        attempts: usize,
    },
    /// The run result was replaced by placeholder content.
    FallbackSynthesized { execution_id: ExecutionId, reason: String },
    /// The final snapshot was handed to storage.
    Archived { execution_id: ExecutionId, campaign_id: String },
    /// Storage rejected the final snapshot.
    ArchiveFailed { execution_id: ExecutionId, error: String },
    /// The run is sealed.
    RunCompleted { execution_id: ExecutionId, status: RunStatus, elapsed_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_params_defaults_from_json() {
        let params: CampaignParams =
            serde_json::from_str(r#"{"topic": "sustainable fashion", "brand": "EcoWear"}"#)
                .unwrap();
        assert_eq!(params.budget, 10_000.0);
        assert_eq!(params.market_region, "Global");
        assert!(params.user_profile.is_object());
        assert!(params.include_budget);
        assert!(params.include_personalization);
        assert!(params.extra.is_empty());
    }

    #[test]
    fn test_campaign_params_extra_fields_flatten() {
        let params: CampaignParams = serde_json::from_str(
            r#"{"topic": "t", "brand": "b", "include_budget": false, "tone": "playful", "include_video": false}"#,
        )
        .unwrap();
        assert!(!params.toggle("include_budget"));
        assert!(!params.toggle("include_video"));
        assert!(params.toggle("include_personalization"));
        assert!(params.toggle("never_declared"));

        let value = params.to_value();
        assert_eq!(value["tone"], "playful");
        assert_eq!(value["topic"], "t");
    }

    #[test]
    fn test_node_status_terminal() {
        assert!(!NodeStatus::Idle.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Completed.is_terminal());
        assert!(NodeStatus::Error.is_terminal());
    }

    #[test]
    fn test_node_kind_serde() {
        let kind: NodeKind = serde_json::from_str(r#""aggregator""#).unwrap();
        assert_eq!(kind, NodeKind::Aggregator);
        assert_eq!(serde_json::to_string(&NodeKind::Sink).unwrap(), r#""sink""#);
    }

    #[test]
    fn test_provider_reply_helpers() {
        assert!(ProviderReply::text("hello").is_ok());
        let failure = ProviderReply::unavailable("no key");
        assert_eq!(
            failure,
            ProviderReply::Failure {
                kind: FailureKind::Unavailable,
                message: "no key".into()
            }
        );
    }
}
