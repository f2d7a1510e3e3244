//! Pure aggregations between the generator stages.

use adbrain_core::error::Result;
use adbrain_core::types::NodeStatus;

use crate::context::ExecutionContext;
use crate::registry::{Aggregate, NodeRegistry};
use crate::scoring::{
    breakthrough_probability, market_saturation, timing_score, timing_window, viral_potential,
    ViralInputs,
};

use super::prompts::primary_trend;
use super::{
    CREATIVE_SYNTHESIS, GENERATORS, NEUROSYMBOLIC_REASONING, PERSONALIZATION, TREND_DETECTION,
};

pub const MARKET_INTELLIGENCE: &str = "market_intelligence";
pub const NARRATIVE_ALIGNMENT: &str = "narrative_alignment";
pub const VIRAL_POTENTIAL: &str = "viral_potential";
pub const LEARNING_FEEDBACK: &str = "learning_feedback";

const BRAND_COHERENCE: f64 = 9.1;
const INSIGHT_DEPTH: f64 = 9.2;

pub fn register(registry: &mut NodeRegistry) {
    registry.register_combiner(MARKET_INTELLIGENCE, market_intelligence);
    registry.register_combiner(NARRATIVE_ALIGNMENT, narrative_alignment);
    registry.register_combiner(VIRAL_POTENTIAL, viral_analysis);
    registry.register_combiner(LEARNING_FEEDBACK, learning_feedback);
}

fn market_intelligence(ctx: &ExecutionContext) -> Result<Aggregate> {
    let signals = ctx.market_signals();
    let window = timing_window(signals.social_momentum, signals.news_relevance);
    let report = ctx.result_text(TREND_DETECTION).unwrap_or_default();

    let output = serde_json::json!({
        "timing_analysis": window,
        "competitive_intelligence": {
            "competitor_activity": "moderate",
            "market_saturation": market_saturation(signals.novelty),
            "differentiation_opportunity": "high",
            "competitive_advantage_duration": "6_months",
        },
        "primary_trend": primary_trend(&report, &ctx.params().topic),
        "cultural_resonance": signals.relevance_score,
    });

    Ok(Aggregate::new(output)
        .with_metric("timing_score", window.cultural_momentum)
        .with_metric("relevance_score", signals.relevance_score))
}

fn narrative_alignment(ctx: &ExecutionContext) -> Result<Aggregate> {
    let params = ctx.params();
    let report = ctx.result_text(TREND_DETECTION).unwrap_or_default();
    let trend = primary_trend(&report, &params.topic);

    let output = serde_json::json!({
        "brand_essence": format!("{} as a natural part of {}", params.brand, params.topic),
        "narrative_framework": {
            "central_theme": format!("{} meets {}", params.brand, trend),
            "story_arc": ["tension", "discovery", "transformation", "belonging"],
            "emotional_journey": "curiosity to conviction",
            "cultural_anchors": [trend, params.market_region.clone()],
        },
        "emotional_mapping": {
            "primary": "aspiration",
            "secondary": "authenticity",
            "avoid": ["guilt", "fear"],
        },
    });

    Ok(Aggregate::new(output).with_metric("brand_coherence_score", BRAND_COHERENCE))
}

fn node_status(ctx: &ExecutionContext, node_id: &str) -> Option<NodeStatus> {
    let value = ctx.result(node_id)?;
    if value.get("error").is_some() {
        Some(NodeStatus::Error)
    } else {
        Some(NodeStatus::Completed)
    }
}

fn is_skipped(ctx: &ExecutionContext, node_id: &str) -> bool {
    ctx.result(node_id)
        .and_then(|v| v.get("status"))
        .and_then(|s| s.as_str())
        == Some("skipped")
}

/// Sub-scores for the viral formula, read from what the generators produced.
pub(crate) fn viral_inputs(ctx: &ExecutionContext) -> ViralInputs {
    let signals = ctx.market_signals();
    let creative_output = ctx.result(CREATIVE_SYNTHESIS);
    let creative = match node_status(ctx, CREATIVE_SYNTHESIS) {
        Some(NodeStatus::Completed) => creative_output
            .and_then(|c| c.get("creative_score"))
            .and_then(|s| s.as_f64())
            .unwrap_or(8.0),
        _ => 0.0,
    };
    let cultural = creative_output
        .filter(|c| c.get("error").is_none())
        .and_then(|c| c.get("cultural_alignment"))
        .and_then(|s| s.as_f64())
        .unwrap_or(signals.relevance_score);
    let timing = ctx
        .metric("timing_score")
        .unwrap_or_else(|| timing_score(signals.social_momentum, signals.news_relevance));
    let personalization = if is_skipped(ctx, PERSONALIZATION) {
        5.0
    } else {
        match node_status(ctx, PERSONALIZATION) {
            Some(NodeStatus::Completed) => 8.5,
            _ => 0.0,
        }
    };

    ViralInputs {
        creative,
        cultural,
        timing,
        personalization,
    }
}

fn viral_analysis(ctx: &ExecutionContext) -> Result<Aggregate> {
    let inputs = viral_inputs(ctx);
    let novelty = ctx.market_signals().novelty;
    let viral = viral_potential(inputs);
    let saturation = market_saturation(novelty);
    let breakthrough = breakthrough_probability(viral, novelty, saturation);

    let output = serde_json::json!({
        "viral_potential_score": viral,
        "breakthrough_probability": breakthrough,
        "market_saturation": saturation,
        "sub_scores": {
            "creative": inputs.creative,
            "cultural": inputs.cultural,
            "timing": inputs.timing,
            "personalization": inputs.personalization,
        },
    });

    Ok(Aggregate::new(output)
        .with_metric("viral_coefficient", viral)
        .with_metric("breakthrough_probability", breakthrough))
}

fn learning_feedback(ctx: &ExecutionContext) -> Result<Aggregate> {
    let mut performance = serde_json::Map::new();
    for (node_id, label) in GENERATORS {
        if let Some(secs) = ctx.metric(&format!("{}_time", node_id)) {
            performance.insert(
                label.to_string(),
                serde_json::json!({
                    "execution_time": secs,
                    "status": if is_skipped(ctx, node_id) {
                        "skipped"
                    } else if node_status(ctx, node_id) == Some(NodeStatus::Error) {
                        "error"
                    } else {
                        "completed"
                    },
                }),
            );
        }
    }

    let viral = ctx.metric("viral_coefficient").unwrap_or(0.0);
    let timing = ctx.metric("timing_score").unwrap_or(0.0);
    let agents = ctx.active_agents().len();

    let mut opportunities = Vec::new();
    if viral <= 8.0 {
        opportunities.push("strengthen creative hooks before launch");
    }
    if timing <= 0.8 {
        opportunities.push("wait for stronger cultural momentum");
    }
    if agents < GENERATORS.len() {
        opportunities.push("re-run the agents that did not contribute");
    }

    let output = serde_json::json!({
        "agent_performance": performance,
        "success_indicators": {
            "high_viral_potential": viral > 8.0,
            "strong_timing": timing > 0.8,
            "agent_coverage": agents >= 4,
        },
        "optimization_opportunities": opportunities,
    });

    let mut aggregate = Aggregate::new(output);
    if node_status(ctx, NEUROSYMBOLIC_REASONING) == Some(NodeStatus::Completed) {
        aggregate = aggregate.with_metric("insight_depth_score", INSIGHT_DEPTH);
    }
    Ok(aggregate)
}
