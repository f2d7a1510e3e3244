//! Campaign scoring formulas.
//!
//! Every input is sanitized first: NaN becomes 0 and values are clamped to
//! their documented range, so every output stays in range too.

use serde::{Deserialize, Serialize};

fn sanitize(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

/// Timing score on [0,1] from social momentum and news relevance (each 0-10).
pub fn timing_score(social_momentum: f64, news_relevance: f64) -> f64 {
    let social = sanitize(social_momentum, 10.0);
    let news = sanitize(news_relevance, 10.0);
    (0.4 * social + 0.6 * news) / 10.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaunchWindow {
    FirstMover,
    Next72Hours,
    NextWeek,
}

impl LaunchWindow {
    pub fn from_timing(score: f64) -> Self {
        if score > 0.8 {
            Self::FirstMover
        } else if score > 0.7 {
            Self::Next72Hours
        } else {
            Self::NextWeek
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstMover => "first_mover",
            Self::Next72Hours => "next_72_hours",
            Self::NextWeek => "next_week",
        }
    }
}

/// The cultural timing window derived from a timing score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingWindow {
    pub optimal_launch_window: LaunchWindow,
    /// The timing score itself.
    pub cultural_momentum: f64,
    pub trend_lifecycle_stage: String,
    pub competitive_window: String,
}

pub fn timing_window(social_momentum: f64, news_relevance: f64) -> TimingWindow {
    let score = timing_score(social_momentum, news_relevance);
    TimingWindow {
        optimal_launch_window: LaunchWindow::from_timing(score),
        cultural_momentum: score,
        trend_lifecycle_stage: if score > 0.8 { "emerging" } else { "growing" }.to_string(),
        competitive_window: if score > 0.85 { "first_mover" } else { "fast_follower" }.to_string(),
    }
}

/// Sub-scores feeding the viral potential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViralInputs {
    /// Creative quality, 0-10.
    pub creative: f64,
    /// Cultural relevance, 0-10.
    pub cultural: f64,
    /// Timing score, 0-1 (scaled by 10 inside the formula).
    pub timing: f64,
    /// Personalization depth, 0-10.
    pub personalization: f64,
}

/// Viral potential on [0,10]. Non-decreasing in every sub-score.
pub fn viral_potential(inputs: ViralInputs) -> f64 {
    let creative = sanitize(inputs.creative, 10.0);
    let cultural = sanitize(inputs.cultural, 10.0);
    let timing = sanitize(inputs.timing, 1.0) * 10.0;
    let personalization = sanitize(inputs.personalization, 10.0);

    let weighted = 0.3 * creative + 0.3 * cultural + 0.25 * timing + 0.15 * personalization;
    (10.0 * weighted / 10.0).clamp(0.0, 10.0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarketSaturation {
    Low,
    Moderate,
}

/// Novel topics face a less saturated market.
pub fn market_saturation(novelty: f64) -> MarketSaturation {
    if sanitize(novelty, 1.0) > 0.7 {
        MarketSaturation::Low
    } else {
        MarketSaturation::Moderate
    }
}

/// Probability of a breakthrough moment, on [0,1].
pub fn breakthrough_probability(viral: f64, novelty: f64, saturation: MarketSaturation) -> f64 {
    let base = sanitize(viral, 10.0) / 10.0;
    let trend_boost = if sanitize(novelty, 1.0) > 0.8 { 0.1 } else { 0.0 };
    let competitive_boost = if saturation == MarketSaturation::Low { 0.15 } else { 0.0 };
    (base + trend_boost + competitive_boost).clamp(0.0, 1.0)
}

/// 10 × the share of generators that completed.
pub fn completeness(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    10.0 * (completed.min(total) as f64) / (total as f64)
}

/// Launch readiness on [0,10].
pub fn launch_readiness(completeness: f64, quality: f64, viral: f64, timing: f64) -> f64 {
    (sanitize(completeness, 10.0)
        + sanitize(quality, 10.0)
        + sanitize(viral, 10.0)
        + sanitize(timing, 1.0) * 10.0)
        / 4.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    FullAutonomous,
    HumanOversight,
}

impl AutonomyLevel {
    pub fn from_readiness(readiness: f64) -> Self {
        if readiness > 8.5 {
            Self::FullAutonomous
        } else {
            Self::HumanOversight
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullAutonomous => "full_autonomous",
            Self::HumanOversight => "human_oversight",
        }
    }
}
