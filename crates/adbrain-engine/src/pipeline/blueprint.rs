//! The campaign blueprint assembled by the deployment sink.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::types::CampaignParams;

use crate::context::ExecutionContext;
use crate::registry::{NodeRegistry, TerminalArtifacts};
use crate::scoring::{completeness, launch_readiness, timing_window, AutonomyLevel, TimingWindow};

use super::{BUDGET_OPTIMIZATION, CREATIVE_SYNTHESIS, DEPLOYMENT, GENERATORS, PERSONALIZATION};

pub const CAMPAIGN_BLUEPRINT: &str = "campaign_blueprint";

const DEFAULT_QUALITY: f64 = 8.0;
const PLACEHOLDER_SCORE: f64 = 5.0;

/// Deployable description of a campaign.
///
/// Live runs and synthesized fallbacks both serialize this struct, so their
/// key sets always agree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignBlueprint {
    pub campaign_id: String,
    pub brand: String,
    pub topic: String,
    pub market_region: String,
    pub budget: f64,
    pub creative_assets: serde_json::Value,
    pub budget_allocation: serde_json::Value,
    pub personalization_matrix: serde_json::Value,
    pub launch_timing: TimingWindow,
    pub viral_potential: f64,
    pub breakthrough_probability: f64,
    pub launch_readiness: f64,
    pub autonomy_level: AutonomyLevel,
    pub success_metrics: SuccessMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessMetrics {
    pub target_engagement_rate: f64,
    pub target_share_rate: f64,
    pub viral_threshold: f64,
}

impl SuccessMetrics {
    fn for_viral(viral: f64) -> Self {
        Self {
            target_engagement_rate: 0.05,
            target_share_rate: 0.02,
            viral_threshold: (viral * 0.8 * 10.0).round() / 10.0,
        }
    }
}

impl CampaignBlueprint {
    /// Placeholder blueprint for when the pipeline could not produce one.
    pub fn placeholder(params: &CampaignParams) -> Self {
        let timing = timing_window(5.0, 5.0);
        let viral = PLACEHOLDER_SCORE;
        Self {
            campaign_id: campaign_id(&params.brand, "synthesized"),
            brand: params.brand.clone(),
            topic: params.topic.clone(),
            market_region: params.market_region.clone(),
            budget: params.budget,
            creative_assets: placeholder_creative(params),
            budget_allocation: if params.include_budget {
                placeholder_text("BudgetOptimizer", params)
            } else {
                skipped()
            },
            personalization_matrix: if params.include_personalization {
                placeholder_text("PersonalizationAgent", params)
            } else {
                skipped()
            },
            launch_timing: timing,
            viral_potential: viral,
            breakthrough_probability: 0.5,
            launch_readiness: 0.0,
            autonomy_level: AutonomyLevel::HumanOversight,
            success_metrics: SuccessMetrics::for_viral(viral),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Stand-in for a text generator's reply.
pub fn placeholder_text(label: &str, params: &CampaignParams) -> serde_json::Value {
    serde_json::Value::String(format!(
        "[synthesized] {} output for {} / {} is unavailable; regenerate before launch",
        label, params.brand, params.topic
    ))
}

/// Stand-in creative payload with every key the creative prompt asks for.
pub fn placeholder_creative(params: &CampaignParams) -> serde_json::Value {
    serde_json::json!({
        "headlines": [format!("[synthesized] {} for {}", params.brand, params.topic)],
        "copy": ["[synthesized] placeholder copy, regenerate before launch"],
        "elevator_pitch": "[synthesized]",
        "visual_concepts": [],
        "creative_score": PLACEHOLDER_SCORE,
        "cultural_alignment": PLACEHOLDER_SCORE,
        "synthesized": true,
    })
}

fn skipped() -> serde_json::Value {
    serde_json::json!({ "status": "skipped" })
}

fn campaign_id(brand: &str, suffix: &str) -> String {
    let slug: String = brand
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", slug, suffix)
}

/// Commands for the (external) deployment layer.
pub fn deployment_commands(blueprint: &CampaignBlueprint) -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "action": "initialize_campaigns",
            "campaign_id": blueprint.campaign_id,
            "timing": blueprint.launch_timing.optimal_launch_window,
            "budget": blueprint.budget,
        }),
        serde_json::json!({
            "action": "activate_personalization",
            "campaign_id": blueprint.campaign_id,
            "timing": "immediate",
        }),
        serde_json::json!({
            "action": "monitor_viral_metrics",
            "campaign_id": blueprint.campaign_id,
            "timing": "continuous",
            "viral_threshold": blueprint.success_metrics.viral_threshold,
        }),
    ]
}

pub fn register(registry: &mut NodeRegistry) {
    registry.register_assembler(CAMPAIGN_BLUEPRINT, assemble);
}

fn usable(ctx: &ExecutionContext, node_id: &str) -> Option<serde_json::Value> {
    let value = ctx.result(node_id)?;
    if value.get("error").is_some() {
        return None;
    }
    Some(value.clone())
}

fn assemble(ctx: &ExecutionContext) -> Result<TerminalArtifacts> {
    let params = ctx.params();
    let creative_assets = usable(ctx, CREATIVE_SYNTHESIS).ok_or_else(|| AdbrainError::NodeExecution {
        node: DEPLOYMENT.to_string(),
        message: "no creative assets to deploy".to_string(),
    })?;

    let signals = ctx.market_signals();
    let launch_timing = timing_window(signals.social_momentum, signals.news_relevance);
    let viral = ctx.metric("viral_coefficient").unwrap_or(0.0);
    let breakthrough = ctx.metric("breakthrough_probability").unwrap_or(0.0);

    let expected = GENERATORS
        .iter()
        .filter(|(id, _)| {
            ctx.result(id)
                .and_then(|v| v.get("status"))
                .and_then(|s| s.as_str())
                != Some("skipped")
        })
        .count();
    let complete = completeness(ctx.active_agents().len(), expected);
    let quality = ctx.metric("insight_depth_score").unwrap_or(DEFAULT_QUALITY);
    let readiness = launch_readiness(complete, quality, viral, launch_timing.cultural_momentum);

    let blueprint = CampaignBlueprint {
        campaign_id: campaign_id(&params.brand, &Utc::now().timestamp().to_string()),
        brand: params.brand.clone(),
        topic: params.topic.clone(),
        market_region: params.market_region.clone(),
        budget: params.budget,
        creative_assets,
        budget_allocation: usable(ctx, BUDGET_OPTIMIZATION).unwrap_or(serde_json::Value::Null),
        personalization_matrix: usable(ctx, PERSONALIZATION).unwrap_or(serde_json::Value::Null),
        launch_timing,
        viral_potential: viral,
        breakthrough_probability: breakthrough,
        launch_readiness: readiness,
        autonomy_level: AutonomyLevel::from_readiness(readiness),
        success_metrics: SuccessMetrics::for_viral(viral),
    };

    Ok(TerminalArtifacts {
        deployment_commands: deployment_commands(&blueprint),
        blueprint: blueprint.to_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbrain_core::types::MarketSignals;
    use adbrain_test_utils::{campaign_params, creative_payload};

    #[test]
    fn test_assemble_requires_creative() {
        let ctx = ExecutionContext::new(campaign_params(), MarketSignals::default());
        let err = assemble(&ctx).unwrap_err();
        assert!(err.to_string().contains("no creative assets"));
    }

    #[test]
    fn test_assemble_blueprint() {
        let mut ctx = ExecutionContext::new(campaign_params(), MarketSignals::default());
        ctx.record_result(CREATIVE_SYNTHESIS, creative_payload());
        ctx.record_result(BUDGET_OPTIMIZATION, serde_json::json!({"status": "skipped"}));
        ctx.push_agent("CreativeSynthesizer");
        ctx.set_metric("viral_coefficient", 8.2);

        let artifacts = assemble(&ctx).unwrap();
        let bp = &artifacts.blueprint;
        assert_eq!(bp["brand"], "EcoWear");
        assert_eq!(bp["viral_potential"], 8.2);
        assert_eq!(bp["creative_assets"]["creative_score"], 8.7);
        assert_eq!(bp["budget_allocation"]["status"], "skipped");
        assert!(bp["personalization_matrix"].is_null());
        assert_eq!(artifacts.deployment_commands.len(), 3);
        assert_eq!(artifacts.deployment_commands[0]["action"], "initialize_campaigns");
    }

    #[test]
    fn test_placeholder_matches_live_keys() {
        let mut ctx = ExecutionContext::new(campaign_params(), MarketSignals::default());
        ctx.record_result(CREATIVE_SYNTHESIS, creative_payload());
        let live = assemble(&ctx).unwrap().blueprint;
        let placeholder = CampaignBlueprint::placeholder(&campaign_params()).to_value();

        let live_keys: Vec<_> = live.as_object().unwrap().keys().collect();
        let placeholder_keys: Vec<_> = placeholder.as_object().unwrap().keys().collect();
        assert_eq!(live_keys, placeholder_keys);
    }

    #[test]
    fn test_placeholder_creative_has_scores() {
        let placeholder = CampaignBlueprint::placeholder(&campaign_params()).to_value();
        let assets = &placeholder["creative_assets"];
        for key in creative_payload().as_object().unwrap().keys() {
            assert!(assets.get(key).is_some(), "placeholder creative lacks {key}");
        }
        assert_eq!(assets["creative_score"], 5.0);
        assert_eq!(assets["cultural_alignment"], 5.0);
        assert!(placeholder["budget_allocation"]
            .as_str()
            .unwrap()
            .contains("BudgetOptimizer"));

        let mut params = campaign_params();
        params.include_personalization = false;
        let placeholder = CampaignBlueprint::placeholder(&params).to_value();
        assert_eq!(placeholder["personalization_matrix"]["status"], "skipped");
    }

    #[test]
    fn test_campaign_id_slug() {
        assert_eq!(campaign_id("Eco Wear!", "x"), "eco_wear__x");
    }
}
