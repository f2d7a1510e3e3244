//! The advertising campaign pipeline.
//!
//! ```text
//! campaign_trigger → cultural_trend_detection → market_intelligence
//!   ├→ neurosymbolic_reasoning ─┐
//!   └→ narrative_alignment ─────┴→ creative_synthesis
//!        ├→ autonomous_optimization ─┐
//!        └→ personalization_engine ──┴→ viral_potential_analyzer
//!             → continuous_learning → deployment_orchestrator
//! ```

pub mod blueprint;
pub mod combiners;
pub mod prompts;

use adbrain_core::types::NodeKind;

use crate::graph::{Edge, GraphDescriptor, NodeDescriptor, OutputFormat, Position};
use crate::registry::NodeRegistry;

pub const PIPELINE_ID: &str = "advertising_campaign";

pub const TRIGGER: &str = "campaign_trigger";
pub const TREND_DETECTION: &str = "cultural_trend_detection";
pub const MARKET_INTELLIGENCE: &str = "market_intelligence";
pub const NEUROSYMBOLIC_REASONING: &str = "neurosymbolic_reasoning";
pub const NARRATIVE_ALIGNMENT: &str = "narrative_alignment";
pub const CREATIVE_SYNTHESIS: &str = "creative_synthesis";
pub const BUDGET_OPTIMIZATION: &str = "autonomous_optimization";
pub const PERSONALIZATION: &str = "personalization_engine";
pub const VIRAL_ANALYZER: &str = "viral_potential_analyzer";
pub const CONTINUOUS_LEARNING: &str = "continuous_learning";
pub const DEPLOYMENT: &str = "deployment_orchestrator";

/// Generator node ids and their agent labels, in visitation order.
pub const GENERATORS: [(&str, &str); 5] = [
    (TREND_DETECTION, "TrendHarvester"),
    (NEUROSYMBOLIC_REASONING, "AnalogicalReasoner"),
    (CREATIVE_SYNTHESIS, "CreativeSynthesizer"),
    (BUDGET_OPTIMIZATION, "BudgetOptimizer"),
    (PERSONALIZATION, "PersonalizationAgent"),
];

/// Metrics written by the pipeline's aggregators.
pub const METRIC_KEYS: [&str; 6] = [
    "timing_score",
    "relevance_score",
    "brand_coherence_score",
    "insight_depth_score",
    "viral_coefficient",
    "breakthrough_probability",
];

const EDGES: [(&str, &str); 12] = [
    (TRIGGER, TREND_DETECTION),
    (TREND_DETECTION, MARKET_INTELLIGENCE),
    (MARKET_INTELLIGENCE, NEUROSYMBOLIC_REASONING),
    (MARKET_INTELLIGENCE, NARRATIVE_ALIGNMENT),
    (NEUROSYMBOLIC_REASONING, CREATIVE_SYNTHESIS),
    (NARRATIVE_ALIGNMENT, CREATIVE_SYNTHESIS),
    (CREATIVE_SYNTHESIS, BUDGET_OPTIMIZATION),
    (CREATIVE_SYNTHESIS, PERSONALIZATION),
    (BUDGET_OPTIMIZATION, VIRAL_ANALYZER),
    (PERSONALIZATION, VIRAL_ANALYZER),
    (VIRAL_ANALYZER, CONTINUOUS_LEARNING),
    (CONTINUOUS_LEARNING, DEPLOYMENT),
];

fn node(
    id: &str,
    kind: NodeKind,
    label: &str,
    function: Option<&str>,
    (x, y): (i32, i32),
) -> NodeDescriptor {
    NodeDescriptor {
        id: id.to_string(),
        kind,
        label: label.to_string(),
        function: function.map(str::to_string),
        output_format: OutputFormat::Text,
        toggle: None,
        position: Position { x, y },
    }
}

fn generator(id: &str, label: &str, prompt: &str, position: (i32, i32)) -> NodeDescriptor {
    node(id, NodeKind::Generator, label, Some(prompt), position)
}

fn aggregator(id: &str, label: &str, combiner: &str, position: (i32, i32)) -> NodeDescriptor {
    node(id, NodeKind::Aggregator, label, Some(combiner), position)
}

fn with_toggle(mut node: NodeDescriptor, toggle: &str) -> NodeDescriptor {
    node.toggle = Some(toggle.to_string());
    node
}

/// The declarative advertising pipeline.
pub fn advertising_pipeline() -> GraphDescriptor {
    let mut creative = generator(CREATIVE_SYNTHESIS, "CreativeSynthesizer", prompts::CREATIVE, (900, 200));
    creative.output_format = OutputFormat::Json;

    let nodes = vec![
        node(TRIGGER, NodeKind::Trigger, "Campaign Trigger", None, (100, 200)),
        generator(TREND_DETECTION, "TrendHarvester", prompts::TREND, (300, 200)),
        aggregator(MARKET_INTELLIGENCE, "Market Intelligence", combiners::MARKET_INTELLIGENCE, (500, 200)),
        generator(NEUROSYMBOLIC_REASONING, "AnalogicalReasoner", prompts::ANALOGY, (700, 100)),
        aggregator(NARRATIVE_ALIGNMENT, "Narrative Alignment", combiners::NARRATIVE_ALIGNMENT, (700, 300)),
        creative,
        with_toggle(
            generator(BUDGET_OPTIMIZATION, "BudgetOptimizer", prompts::BUDGET, (1100, 100)),
            "include_budget",
        ),
        with_toggle(
            generator(PERSONALIZATION, "PersonalizationAgent", prompts::PERSONALIZATION, (1100, 300)),
            "include_personalization",
        ),
        aggregator(VIRAL_ANALYZER, "Viral Potential Analyzer", combiners::VIRAL_POTENTIAL, (1300, 200)),
        aggregator(CONTINUOUS_LEARNING, "Continuous Learning", combiners::LEARNING_FEEDBACK, (1500, 200)),
        node(DEPLOYMENT, NodeKind::Sink, "Deployment Orchestrator", Some(blueprint::CAMPAIGN_BLUEPRINT), (1700, 200)),
    ];

    GraphDescriptor {
        id: PIPELINE_ID.to_string(),
        name: "Advertising Campaign Pipeline".to_string(),
        nodes,
        edges: EDGES.iter().map(|(from, to)| Edge::new(*from, *to)).collect(),
    }
}

/// All pipeline node ids, in declaration order.
pub fn node_ids() -> Vec<String> {
    advertising_pipeline().nodes.into_iter().map(|n| n.id).collect()
}

/// Register every prompt builder, combiner, and assembler the pipeline names.
pub fn register(registry: &mut NodeRegistry) {
    prompts::register(registry);
    combiners::register(registry);
    blueprint::register(registry);
}

/// A registry holding just the pipeline's functions.
pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register(&mut registry);
    registry
}

/// Audience profile used when the caller supplies none.
pub fn sample_user_profile() -> serde_json::Value {
    serde_json::json!({
        "demographics": {
            "age_range": "25-34",
            "income": "$50k-$75k",
            "education": "Bachelor's degree",
            "location": "Urban"
        },
        "interests": ["Technology", "Sustainability", "Health & Wellness", "Professional Development"],
        "behavior": {
            "shopping_preference": "Online research, in-store purchase",
            "social_media_usage": "High",
            "brand_loyalty": "Medium",
            "early_adopter": true
        },
        "preferences": {
            "content_format": ["Video", "Infographics", "Articles"],
            "communication_style": "Professional but approachable",
            "contact_frequency": "Weekly"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowGraph;

    #[test]
    fn test_pipeline_is_valid() {
        let graph = WorkflowGraph::from_descriptor(&advertising_pipeline()).unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.trigger_nodes().unwrap()[0].id, TRIGGER);
        assert_eq!(graph.len(), 11);
    }

    #[test]
    fn test_every_function_registered() {
        let graph = WorkflowGraph::from_descriptor(&advertising_pipeline()).unwrap();
        let registry = registry();
        for node in graph.nodes() {
            registry.check(node).unwrap();
        }
    }

    #[test]
    fn test_generators_table_matches_nodes() {
        let graph = WorkflowGraph::from_descriptor(&advertising_pipeline()).unwrap();
        for (id, label) in GENERATORS {
            let node = graph.node(id).unwrap();
            assert_eq!(node.kind, NodeKind::Generator);
            assert_eq!(node.label, label);
        }
        let generator_count = graph
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::Generator)
            .count();
        assert_eq!(generator_count, GENERATORS.len());
    }

    #[test]
    fn test_joins() {
        let graph = WorkflowGraph::from_descriptor(&advertising_pipeline()).unwrap();
        assert_eq!(graph.predecessors(CREATIVE_SYNTHESIS).unwrap().len(), 2);
        assert_eq!(graph.predecessors(VIRAL_ANALYZER).unwrap().len(), 2);
        assert!(graph.successors(DEPLOYMENT).unwrap().is_empty());
    }
}
