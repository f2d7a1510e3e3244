use adbrain_core::types::{CampaignParams, MarketSignals, NodeKind};
use tracing::warn;

use crate::context::{ContextSnapshot, ExecutionContext};
use crate::pipeline::blueprint::{
    deployment_commands, placeholder_creative, placeholder_text, CampaignBlueprint,
};
use crate::pipeline::{self, CREATIVE_SYNTHESIS, DEPLOYMENT, GENERATORS, METRIC_KEYS};

const SYNTHESIZED: &str = "synthesized";

/// Builds schema-complete placeholder results when the live pipeline cannot.
///
/// Generators get labelled placeholder output and the pipeline's own
/// combiners then run over it, so every node result has the same nested
/// shape a successful run produces. The snapshot also carries every metric,
/// a full blueprint, and deployment commands, all marked as synthesized.
pub struct FallbackSynthesizer;

impl FallbackSynthesizer {
    pub fn build(params: &CampaignParams) -> ContextSnapshot {
        let descriptor = pipeline::advertising_pipeline();
        let registry = pipeline::registry();
        let mut ctx = ExecutionContext::new(params.clone(), MarketSignals::default());

        for node in &descriptor.nodes {
            match node.kind {
                NodeKind::Trigger => ctx.record_result(&node.id, params.to_value()),
                NodeKind::Generator => {
                    let switched_off = node.toggle.as_deref().is_some_and(|t| !params.toggle(t));
                    let output = if switched_off {
                        serde_json::json!({ "status": "skipped" })
                    } else if node.id == CREATIVE_SYNTHESIS {
                        placeholder_creative(params)
                    } else {
                        placeholder_text(&node.label, params)
                    };
                    ctx.record_result(&node.id, output);
                }
                NodeKind::Aggregator => {
                    let function = node.function.as_deref().unwrap_or_default();
                    let output = match registry.combiner(function).map(|combine| combine(&ctx)) {
                        Some(Ok(aggregate)) => {
                            for (key, value) in aggregate.metrics {
                                ctx.set_metric(key, value);
                            }
                            mark_synthesized(aggregate.output)
                        }
                        Some(Err(e)) => {
                            warn!(node_id = %node.id, error = %e, "Placeholder aggregation failed");
                            serde_json::json!({ "error": e.to_string(), "synthesized": true })
                        }
                        None => {
                            warn!(node_id = %node.id, function, "No combiner for placeholder aggregation");
                            serde_json::json!({ "synthesized": true })
                        }
                    };
                    ctx.record_result(&node.id, output);
                }
                // Written below from the placeholder blueprint
                NodeKind::Sink => {}
            }
            ctx.set_metric(format!("{}_time", node.id), 0.0);
        }

        let mut snapshot = ctx.snapshot();

        let blueprint = CampaignBlueprint::placeholder(params);
        let commands = deployment_commands(&blueprint);
        let blueprint = blueprint.to_value();
        snapshot.results.insert(
            DEPLOYMENT.to_string(),
            serde_json::json!({
                "blueprint": blueprint,
                "deployment_commands": commands,
            }),
        );

        for key in METRIC_KEYS {
            snapshot.metrics.entry(key.to_string()).or_insert(0.0);
        }
        snapshot.providers_used = GENERATORS
            .iter()
            .map(|(id, _)| (id.to_string(), SYNTHESIZED.to_string()))
            .collect();
        snapshot.blueprint = Some(blueprint);
        snapshot.deployment_commands = commands;
        snapshot.synthesized = true;
        snapshot
    }
}

fn mark_synthesized(mut output: serde_json::Value) -> serde_json::Value {
    if let Some(object) = output.as_object_mut() {
        object.insert(SYNTHESIZED.to_string(), serde_json::Value::Bool(true));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use adbrain_core::types::ProviderReply;
    use serde_json::Value;
    use adbrain_llm::{ProviderChain, ProviderDescriptor};
    use adbrain_test_utils::{campaign_params, creative_payload_text, RoutedProvider};

    use crate::graph::{GraphExecutor, WorkflowGraph};

    fn keys(value: &serde_json::Value) -> BTreeSet<String> {
        value
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Paths present in `live` but absent from `fallback`, at any depth.
    fn missing_paths(live: &Value, fallback: &Value, path: &str, missing: &mut Vec<String>) {
        match (live, fallback) {
            (Value::Object(l), Value::Object(f)) => {
                for (key, value) in l {
                    let child = format!("{path}.{key}");
                    match f.get(key) {
                        Some(other) => missing_paths(value, other, &child, missing),
                        None => missing.push(child),
                    }
                }
            }
            (Value::Array(l), Value::Array(f)) => {
                for (i, (value, other)) in l.iter().zip(f).enumerate() {
                    missing_paths(value, other, &format!("{path}[{i}]"), missing);
                }
            }
            (Value::Object(_), _) => missing.push(format!("{path} (not an object)")),
            _ => {}
        }
    }

    async fn live_snapshot(params: CampaignParams) -> ContextSnapshot {
        let provider = RoutedProvider::new("gemini", "Generated content:\n• Circular wardrobes")
            .route("single JSON object", ProviderReply::text(creative_payload_text()));
        let chain = ProviderChain::new().with_provider(ProviderDescriptor::new(Arc::new(provider), 0));
        let executor = GraphExecutor::new(Arc::new(chain), Arc::new(pipeline::registry()));
        let mut graph = WorkflowGraph::from_descriptor(&pipeline::advertising_pipeline()).unwrap();
        let mut ctx = ExecutionContext::new(params, MarketSignals::default());
        let record = executor.run(&mut graph, &mut ctx).await.unwrap();
        assert!(record.context.blueprint.is_some());
        record.context
    }

    #[test]
    fn test_fallback_is_labelled() {
        let snap = FallbackSynthesizer::build(&campaign_params());
        assert!(snap.synthesized);
        assert_eq!(snap.results[pipeline::TRIGGER]["brand"], "EcoWear");
        assert_eq!(snap.results[CREATIVE_SYNTHESIS]["synthesized"], true);
        assert_eq!(snap.results[pipeline::VIRAL_ANALYZER]["synthesized"], true);
        assert!(snap.results[pipeline::TREND_DETECTION]
            .as_str()
            .unwrap()
            .starts_with("[synthesized] TrendHarvester"));
        assert_eq!(snap.blueprint.as_ref().unwrap()["brand"], "EcoWear");
        assert_eq!(snap.deployment_commands.len(), 3);
        assert_eq!(
            snap.results[DEPLOYMENT]["blueprint"],
            *snap.blueprint.as_ref().unwrap()
        );
        assert!(snap.active_agents.is_empty());
        assert!(snap.providers_used.values().all(|p| p == SYNTHESIZED));
    }

    #[tokio::test]
    async fn test_fallback_keys_cover_live_run() {
        let cases = vec![
            campaign_params(),
            CampaignParams::new("electric bikes", "VoltRide").with_budget(2_500.0),
            CampaignParams::new("coffee", "Brew")
                .with_region("LATAM")
                .with_extra("season", serde_json::json!("winter")),
        ];

        let mut switched_off = campaign_params();
        switched_off.include_budget = false;
        switched_off.include_personalization = false;
        let cases = cases.into_iter().chain([switched_off]);

        for params in cases {
            let live = live_snapshot(params.clone()).await;
            let fallback = FallbackSynthesizer::build(&params);

            let live_value = live.to_value();
            let fallback_value = fallback.to_value();
            assert!(keys(&fallback_value).is_superset(&keys(&live_value)));

            let mut missing = Vec::new();
            missing_paths(&live_value, &fallback_value, "$", &mut missing);
            assert!(missing.is_empty(), "fallback lacks {:?} for {}", missing, params.topic);

            let live_results: BTreeSet<_> = live.results.keys().cloned().collect();
            let fallback_results: BTreeSet<_> = fallback.results.keys().cloned().collect();
            assert!(fallback_results.is_superset(&live_results));

            let live_metrics: BTreeSet<_> = live.metrics.keys().cloned().collect();
            let fallback_metrics: BTreeSet<_> = fallback.metrics.keys().cloned().collect();
            assert!(
                fallback_metrics.is_superset(&live_metrics),
                "missing metrics: {:?}",
                live_metrics.difference(&fallback_metrics).collect::<Vec<_>>()
            );

            let live_blueprint = keys(live.blueprint.as_ref().unwrap());
            let fallback_blueprint = keys(fallback.blueprint.as_ref().unwrap());
            assert!(fallback_blueprint.is_superset(&live_blueprint));

            let live_providers: BTreeSet<_> = live.providers_used.keys().cloned().collect();
            let fallback_providers: BTreeSet<_> = fallback.providers_used.keys().cloned().collect();
            assert!(fallback_providers.is_superset(&live_providers));
        }
    }
}
