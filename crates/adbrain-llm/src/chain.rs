use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use adbrain_core::config::AppConfig;
use adbrain_core::event::EventBus;
use adbrain_core::traits::GenerationProvider;
use adbrain_core::types::{ExecutionId, FailureKind, ProviderReply, WorkflowEvent};

use crate::create_provider;

const NO_PROVIDERS: &str = "No providers configured";

/// One backend in the chain, with its rank and failure policy.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Lower ranks are tried first.
    pub priority: u32,
    pub provider: Arc<dyn GenerationProvider>,
    /// Substrings that turn an otherwise successful reply into a failure.
    pub failure_sentinels: Vec<String>,
    pub timeout: Duration,
}

impl ProviderDescriptor {
    pub fn new(provider: Arc<dyn GenerationProvider>, priority: u32) -> Self {
        Self {
            name: provider.name().to_string(),
            priority,
            provider,
            failure_sentinels: adbrain_core::config::default_failure_sentinels(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_sentinels(mut self, sentinels: Vec<String>) -> Self {
        self.failure_sentinels = sentinels;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn sentinel_in(&self, value: &Value) -> Option<&str> {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.failure_sentinels
            .iter()
            .find(|s| !s.is_empty() && text.contains(s.as_str()))
            .map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Outcome of one `ProviderChain::invoke`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResult {
    /// The first usable reply, or the last failure text.
    pub output: Value,
    /// `None` when every provider failed.
    pub provider_used: Option<String>,
    /// Number of providers called.
    pub attempts: usize,
}

impl ChainResult {
    pub fn is_success(&self) -> bool {
        self.provider_used.is_some()
    }

    /// The output as text (JSON values are serialized).
    pub fn text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Priority-ordered list of interchangeable generation backends.
///
/// Each provider gets a single attempt per invocation. Errors never escape:
/// exhausting the chain yields the last failure text as the output.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<ProviderDescriptor>,
    event_bus: Option<Arc<EventBus>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Add a provider. Ties on priority keep insertion order.
    pub fn push(&mut self, descriptor: ProviderDescriptor) {
        self.providers.push(descriptor);
        self.providers.sort_by_key(|d| d.priority);
    }

    pub fn with_provider(mut self, descriptor: ProviderDescriptor) -> Self {
        self.push(descriptor);
        self
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in rank order until one returns a usable reply.
    pub async fn invoke(&self, prompt: &str) -> ChainResult {
        self.invoke_with(prompt, None).await
    }

    /// Same as `invoke`, tagging published provider events with the run
    /// they belong to.
    pub async fn invoke_for(&self, prompt: &str, execution_id: &ExecutionId) -> ChainResult {
        self.invoke_with(prompt, Some(execution_id)).await
    }

    async fn invoke_with(&self, prompt: &str, execution_id: Option<&ExecutionId>) -> ChainResult {
        let mut last_failure = NO_PROVIDERS.to_string();
        let mut attempts = 0;

        for descriptor in &self.providers {
            attempts += 1;
            let reply = match tokio::time::timeout(
                descriptor.timeout,
                descriptor.provider.generate(prompt.to_string()),
            )
            .await
            {
                Ok(reply) => reply,
                Err(_) => ProviderReply::failure(
                    FailureKind::Timeout,
                    format!(
                        "Error: {} timed out after {}s",
                        descriptor.name,
                        descriptor.timeout.as_secs_f64()
                    ),
                ),
            };

            let reply = match reply {
                ProviderReply::Ok(value) => match descriptor.sentinel_in(&value) {
                    Some(sentinel) => {
                        debug!(provider = %descriptor.name, sentinel, "Reply matched failure sentinel");
                        let message = match value {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        ProviderReply::failure(FailureKind::Sentinel, message)
                    }
                    None => ProviderReply::Ok(value),
                },
                failure => failure,
            };

            match reply {
                ProviderReply::Ok(output) => {
                    if attempts > 1 {
                        info!(provider = %descriptor.name, attempts, "Fell back to alternative provider");
                    }
                    self.publish(WorkflowEvent::ProviderSelected {
                        execution_id: execution_id.cloned(),
                        provider: descriptor.name.clone(),
                        attempts,
                    });
                    return ChainResult {
                        output,
                        provider_used: Some(descriptor.name.clone()),
                        attempts,
                    };
                }
                ProviderReply::Failure { kind, message } => {
                    warn!(
                        provider = %descriptor.name,
                        kind = %kind,
                        error = %message,
                        "Provider failed, trying next"
                    );
                    self.publish(WorkflowEvent::ProviderFailed {
                        execution_id: execution_id.cloned(),
                        provider: descriptor.name.clone(),
                        kind,
                        message: message.clone(),
                    });
                    last_failure = message;
                }
            }
        }

        if attempts > 0 {
            warn!(attempts, "All providers failed");
        }
        ChainResult {
            output: Value::String(last_failure),
            provider_used: None,
            attempts,
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Build the provider chain from configuration.
///
/// Providers without credentials stay in the chain; their adapters report
/// `Unavailable` on every call.
pub fn build_chain(config: &AppConfig, event_bus: Option<Arc<EventBus>>) -> ProviderChain {
    let mut chain = ProviderChain::new();
    if let Some(bus) = event_bus {
        chain = chain.with_event_bus(bus);
    }

    for provider_config in config.provider_configs() {
        let sentinels = provider_config
            .failure_sentinels
            .clone()
            .unwrap_or_else(|| config.engine.failure_sentinels.clone());
        let timeout = Duration::from_secs(
            provider_config
                .timeout_secs
                .unwrap_or(config.engine.default_timeout_secs),
        );
        if provider_config.resolved_api_key().is_none() {
            debug!(provider = %provider_config.name, "No credential configured");
        }
        chain.push(
            ProviderDescriptor::new(create_provider(&provider_config), provider_config.priority)
                .with_sentinels(sentinels)
                .with_timeout(timeout),
        );
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbrain_core::config::ProviderConfig;
    use adbrain_test_utils::{ScriptedProvider, SlowProvider, StaticProvider};

    fn descriptor(provider: Arc<dyn GenerationProvider>, priority: u32) -> ProviderDescriptor {
        ProviderDescriptor::new(provider, priority)
    }

    #[tokio::test]
    async fn test_sentinels_fall_through_to_third_provider() {
        let first = Arc::new(StaticProvider::new("gemini", "Gemini API key not available"));
        let second = Arc::new(StaticProvider::new("mistral", "API Error: 503"));
        let third = Arc::new(StaticProvider::new("huggingface", "OK"));
        let chain = ProviderChain::new()
            .with_provider(descriptor(first.clone(), 0))
            .with_provider(descriptor(second.clone(), 1))
            .with_provider(descriptor(third.clone(), 2));

        let result = chain.invoke("prompt").await;
        assert_eq!(result.output, Value::String("OK".into()));
        assert_eq!(result.provider_used.as_deref(), Some("huggingface"));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_failure_text() {
        let chain = ProviderChain::new()
            .with_provider(descriptor(
                Arc::new(StaticProvider::new("gemini", "Error: quota")),
                0,
            ))
            .with_provider(descriptor(
                Arc::new(StaticProvider::new("mistral", "Mistral API key not available")),
                1,
            ))
            .with_provider(descriptor(
                Arc::new(StaticProvider::new("huggingface", "API Error: 500")),
                2,
            ));

        let result = chain.invoke("prompt").await;
        assert!(!result.is_success());
        assert_eq!(result.text(), "API Error: 500");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let first = Arc::new(ScriptedProvider::new("gemini", vec!["fresh ideas".into()]));
        let second = Arc::new(ScriptedProvider::new("mistral", vec!["unused".into()]));
        let chain = ProviderChain::new()
            .with_provider(descriptor(first.clone(), 0))
            .with_provider(descriptor(second.clone(), 1));

        let result = chain.invoke("prompt").await;
        assert_eq!(result.text(), "fresh ideas");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_priority_order_and_ties_keep_insertion() {
        let chain = ProviderChain::new()
            .with_provider(descriptor(Arc::new(StaticProvider::new("c", "Error: c")), 5))
            .with_provider(descriptor(Arc::new(StaticProvider::new("a", "Error: a")), 1))
            .with_provider(descriptor(Arc::new(StaticProvider::new("b", "Error: b")), 1));

        let names: Vec<_> = chain.providers().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let result = chain.invoke("prompt").await;
        assert_eq!(result.text(), "Error: c");
    }

    #[tokio::test]
    async fn test_each_provider_called_once() {
        let first = Arc::new(ScriptedProvider::new("gemini", vec!["Error: boom".into()]));
        let second = Arc::new(ScriptedProvider::new("mistral", vec!["Error: boom".into()]));
        let chain = ProviderChain::new()
            .with_provider(descriptor(first.clone(), 0))
            .with_provider(descriptor(second.clone(), 1));

        chain.invoke("prompt").await;
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let chain = ProviderChain::new()
            .with_provider(
                descriptor(Arc::new(SlowProvider::new("gemini", Duration::from_secs(5))), 0)
                    .with_timeout(Duration::from_millis(20)),
            )
            .with_provider(descriptor(Arc::new(StaticProvider::new("mistral", "fast")), 1));

        let result = chain.invoke("prompt").await;
        assert_eq!(result.provider_used.as_deref(), Some("mistral"));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let result = ProviderChain::new().invoke("prompt").await;
        assert_eq!(result.text(), "No providers configured");
        assert_eq!(result.attempts, 0);
        assert!(result.provider_used.is_none());
    }

    #[tokio::test]
    async fn test_json_reply_passes_through() {
        let provider = Arc::new(ScriptedProvider::with_replies(
            "gemini",
            vec![ProviderReply::Ok(serde_json::json!({"headline": "Wear the change"}))],
        ));
        let chain = ProviderChain::new().with_provider(descriptor(provider, 0));
        let result = chain.invoke("prompt").await;
        assert_eq!(result.output["headline"], "Wear the change");
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let chain = ProviderChain::new()
            .with_event_bus(bus.clone())
            .with_provider(descriptor(Arc::new(StaticProvider::new("gemini", "Error: x")), 0))
            .with_provider(descriptor(Arc::new(StaticProvider::new("mistral", "ok")), 1));

        chain.invoke("prompt").await;
        match rx.recv().await.unwrap() {
            WorkflowEvent::ProviderFailed {
                execution_id,
                provider,
                kind,
                ..
            } => {
                assert!(execution_id.is_none());
                assert_eq!(provider, "gemini");
                assert_eq!(kind, FailureKind::Sentinel);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            WorkflowEvent::ProviderSelected { provider, attempts, .. } => {
                assert_eq!(provider, "mistral");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_tagged_with_run() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let chain = ProviderChain::new()
            .with_event_bus(bus.clone())
            .with_provider(descriptor(Arc::new(StaticProvider::new("gemini", "Error: x")), 0))
            .with_provider(descriptor(Arc::new(StaticProvider::new("mistral", "ok")), 1));

        let run = ExecutionId::from_string("run-7");
        let result = chain.invoke_for("prompt", &run).await;
        assert_eq!(result.text(), "ok");

        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                WorkflowEvent::ProviderFailed { execution_id, .. }
                | WorkflowEvent::ProviderSelected { execution_id, .. } => {
                    assert_eq!(execution_id, Some(run.clone()));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_build_chain_keeps_providers_without_keys() {
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig::new("mistral", "mistral-small-latest").with_priority(1),
            ProviderConfig::new("gemini", "gemini-1.5-flash").with_priority(0),
        ];
        config.providers[1].timeout_secs = Some(7);

        let chain = build_chain(&config, None);
        let names: Vec<_> = chain.providers().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["gemini", "mistral"]);
        assert_eq!(chain.providers()[0].timeout, Duration::from_secs(7));
        assert_eq!(chain.providers()[1].timeout, Duration::from_secs(30));

        let result = chain.invoke("prompt").await;
        assert!(!result.is_success());
        assert_eq!(result.text(), "Mistral API key not available");
    }
}
