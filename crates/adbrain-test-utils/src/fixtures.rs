use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adbrain_core::types::CampaignParams;

/// The reference campaign: "sustainable fashion" for EcoWear at 10k.
pub fn campaign_params() -> CampaignParams {
    CampaignParams::new("sustainable fashion", "EcoWear").with_budget(10_000.0)
}

/// A well-formed creative synthesis payload, keyed as the creative prompt asks.
pub fn creative_payload() -> serde_json::Value {
    serde_json::json!({
        "headlines": [
            "Wear the Change",
            "Fashion That Gives Back",
            "Made to Be Worn Again"
        ],
        "copy": [
            "Every garment tells the story of the hands and materials behind it.",
            "Join the circular collection and keep great clothes in motion."
        ],
        "elevator_pitch": "EcoWear turns every purchase into a vote for a circular wardrobe.",
        "visual_concepts": [
            "Natural light on raw textures",
            "Earth-tone flat lays of repaired garments"
        ],
        "creative_score": 8.7,
        "cultural_alignment": 8.2
    })
}

/// The creative payload wrapped in a markdown code fence, as models often reply.
pub fn creative_payload_text() -> String {
    format!("```json\n{}\n```", creative_payload())
}

/// Shared call counter for closures registered in tests.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
