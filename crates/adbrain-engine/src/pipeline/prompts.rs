//! Prompt builders for the generator nodes.
//!
//! Each builder is a pure function of the context: same context, same prompt.

use crate::context::ExecutionContext;
use crate::registry::NodeRegistry;
use crate::scoring::timing_window;

use super::{CREATIVE_SYNTHESIS, NARRATIVE_ALIGNMENT, NEUROSYMBOLIC_REASONING, TREND_DETECTION};

pub const TREND: &str = "trend_prompt";
pub const ANALOGY: &str = "analogy_prompt";
pub const CREATIVE: &str = "creative_prompt";
pub const BUDGET: &str = "budget_prompt";
pub const PERSONALIZATION: &str = "personalization_prompt";

const CHANNELS: [&str; 5] = ["TikTok", "Instagram", "YouTube", "Google Ads", "LinkedIn"];

pub fn register(registry: &mut NodeRegistry) {
    registry.register_prompt(TREND, trend_prompt);
    registry.register_prompt(ANALOGY, analogy_prompt);
    registry.register_prompt(CREATIVE, creative_prompt);
    registry.register_prompt(BUDGET, budget_prompt);
    registry.register_prompt(PERSONALIZATION, personalization_prompt);
}

/// First bulleted or numbered line of a trend report, up to any parenthetical.
///
/// Falls back to `default` when the report has no list.
pub fn primary_trend(report: &str, default: &str) -> String {
    for line in report.lines() {
        let line = line.trim();
        let item = line
            .strip_prefix('•')
            .or_else(|| line.strip_prefix('-'))
            .or_else(|| line.strip_prefix('*'))
            .or_else(|| line.strip_prefix("1."));
        if let Some(item) = item {
            let item = item.split('(').next().unwrap_or(item).trim();
            let item = item.trim_matches('*').trim();
            if !item.is_empty() {
                return item.to_string();
            }
        }
    }
    default.to_string()
}

fn trend_prompt(ctx: &ExecutionContext) -> String {
    let params = ctx.params();
    let signals = ctx.market_signals();
    format!(
        "You are a cultural trend analyst. List the five strongest emerging trends around \
         \"{topic}\" in the {region} market, one bullet per trend, each with a short note \
         on why it is gaining momentum.\n\n\
         Current signals: social momentum {social:.1}/10, news relevance {news:.1}/10, \
         novelty {novelty:.2}.",
        topic = params.topic,
        region = params.market_region,
        social = signals.social_momentum,
        news = signals.news_relevance,
        novelty = signals.novelty,
    )
}

fn analogy_prompt(ctx: &ExecutionContext) -> String {
    let params = ctx.params();
    let report = ctx.result_text(TREND_DETECTION).unwrap_or_default();
    let trend = primary_trend(&report, &params.topic);
    format!(
        "Find three cross-domain analogies that connect the trend \"{trend}\" with the \
         brand {brand}. For each, name the source domain, the shared structure, and one \
         campaign idea it suggests.",
        brand = params.brand,
    )
}

fn creative_prompt(ctx: &ExecutionContext) -> String {
    let params = ctx.params();
    let analogies = ctx
        .result_text(NEUROSYMBOLIC_REASONING)
        .unwrap_or_else(|| "none available".to_string());
    let narrative = ctx
        .result(NARRATIVE_ALIGNMENT)
        .and_then(|n| n.get("narrative_framework"))
        .map(|f| f.to_string())
        .unwrap_or_else(|| "{}".to_string());
    let signals = ctx.market_signals();
    let window = timing_window(signals.social_momentum, signals.news_relevance);

    format!(
        "Write advertising creative for {brand} on the topic \"{topic}\".\n\n\
         Analogies to build on:\n{analogies}\n\n\
         Narrative framework: {narrative}\n\
         Launch window: {window}\n\n\
         Reply with a single JSON object with the keys: headlines (array of 3 strings), \
         copy (array of 2 strings), elevator_pitch (string), visual_concepts (array of \
         strings), creative_score (number 0-10), cultural_alignment (number 0-10).",
        brand = params.brand,
        topic = params.topic,
        window = window.optimal_launch_window.as_str(),
    )
}

fn budget_prompt(ctx: &ExecutionContext) -> String {
    let params = ctx.params();
    let signals = ctx.market_signals();
    let window = timing_window(signals.social_momentum, signals.news_relevance);
    format!(
        "Allocate a total advertising budget of ${budget:.0} for {brand} in the {region} \
         market across these channels: {channels}. Give a percentage and an amount per \
         channel, plus one sentence of rationale each. The campaign launches in the \
         {window} window.",
        budget = params.budget,
        brand = params.brand,
        region = params.market_region,
        channels = CHANNELS.join(", "),
        window = window.optimal_launch_window.as_str(),
    )
}

fn personalization_prompt(ctx: &ExecutionContext) -> String {
    let params = ctx.params();
    let profile = if params.user_profile.as_object().map_or(true, |o| o.is_empty()) {
        super::sample_user_profile()
    } else {
        params.user_profile.clone()
    };
    let headlines = ctx
        .result(CREATIVE_SYNTHESIS)
        .and_then(|c| c.get("headlines"))
        .map(|h| h.to_string())
        .unwrap_or_else(|| "[]".to_string());
    format!(
        "Adapt these campaign headlines for the audience profile below. Suggest tone, \
         channel and message variations for each audience segment.\n\n\
         Headlines: {headlines}\n\
         Audience profile: {profile}",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbrain_core::types::{CampaignParams, MarketSignals};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            CampaignParams::new("sustainable fashion", "EcoWear").with_region("Europe"),
            MarketSignals::default(),
        )
    }

    #[test]
    fn test_primary_trend() {
        let report = "Top trends:\n• Circular wardrobes (resale is up 40%)\n• Repair cafes";
        assert_eq!(primary_trend(report, "fallback"), "Circular wardrobes");

        let report = "1. **Upcycled denim** (strong on TikTok)\n2. Rentals";
        assert_eq!(primary_trend(report, "fallback"), "Upcycled denim");

        assert_eq!(primary_trend("no list here", "sustainable fashion"), "sustainable fashion");
    }

    #[test]
    fn test_trend_prompt_mentions_topic_and_region() {
        let prompt = trend_prompt(&ctx());
        assert!(prompt.contains("sustainable fashion"));
        assert!(prompt.contains("Europe"));
    }

    #[test]
    fn test_analogy_prompt_uses_primary_trend() {
        let mut c = ctx();
        c.record_result(TREND_DETECTION, serde_json::json!("- Thrift flipping (Gen Z)\n- Repair"));
        let prompt = analogy_prompt(&c);
        assert!(prompt.contains("\"Thrift flipping\""));
        assert!(prompt.contains("EcoWear"));

        // An errored trend node falls back to the topic
        c.record_result(TREND_DETECTION, serde_json::json!({"error": "all providers failed"}));
        assert!(analogy_prompt(&c).contains("\"sustainable fashion\""));
    }

    #[test]
    fn test_creative_prompt_asks_for_json() {
        let prompt = creative_prompt(&ctx());
        assert!(prompt.contains("single JSON object"));
        assert!(prompt.contains("creative_score"));
        assert!(prompt.contains("none available"));
    }

    #[test]
    fn test_creative_fixture_matches_prompt_schema() {
        let prompt = creative_prompt(&ctx());
        let payload = adbrain_test_utils::creative_payload();
        for key in payload.as_object().unwrap().keys() {
            assert!(prompt.contains(key.as_str()), "prompt does not ask for {key}");
        }

        // Personalization reads the headlines the creative node produced
        let mut c = ctx();
        c.record_result(CREATIVE_SYNTHESIS, payload);
        assert!(personalization_prompt(&c).contains("Wear the Change"));
    }

    #[test]
    fn test_personalization_prompt_uses_sample_profile_when_empty() {
        let prompt = personalization_prompt(&ctx());
        assert!(prompt.contains("Sustainability"));

        let c = ExecutionContext::new(
            CampaignParams::new("coffee", "Brew")
                .with_profile(serde_json::json!({"interests": ["espresso"]})),
            MarketSignals::default(),
        );
        let prompt = personalization_prompt(&c);
        assert!(prompt.contains("espresso"));
        assert!(!prompt.contains("Sustainability"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let c = ctx();
        assert_eq!(budget_prompt(&c), budget_prompt(&c));
        assert!(budget_prompt(&c).contains("$10000"));
    }
}
