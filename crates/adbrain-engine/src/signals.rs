use std::sync::Arc;

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use adbrain_core::config::{SignalMode, SignalsConfig};
use adbrain_core::error::Result;
use adbrain_core::traits::SignalSource;
use adbrain_core::types::MarketSignals;

/// Fixed signal values from configuration.
pub struct StaticSignals {
    signals: MarketSignals,
}

impl StaticSignals {
    pub fn new(signals: MarketSignals) -> Self {
        Self { signals }
    }

    pub fn from_config(config: &SignalsConfig) -> Self {
        Self::new(MarketSignals {
            social_momentum: config.social_momentum,
            news_relevance: config.news_relevance,
            novelty: config.novelty,
            relevance_score: config.relevance_score,
            sources: serde_json::json!({ "mode": "static" }),
        })
    }
}

impl SignalSource for StaticSignals {
    fn fetch(&self, _topic: &str) -> BoxFuture<'_, Result<MarketSignals>> {
        let signals = self.signals.clone();
        Box::pin(async move { Ok(signals) })
    }
}

/// Simulated market data, deterministic per topic.
///
/// Stands in for social and news feeds: the same topic always gets the
/// same signals, different topics get different ones.
pub struct SimulatedSignals;

impl SimulatedSignals {
    /// 64-bit FNV-1a over the normalized topic. Stable across builds and
    /// toolchains, unlike `DefaultHasher`.
    fn seed(topic: &str) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        topic
            .trim()
            .to_lowercase()
            .bytes()
            .fold(OFFSET_BASIS, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
    }

    pub fn signals_for(topic: &str) -> MarketSignals {
        let mut rng = StdRng::seed_from_u64(Self::seed(topic));
        let social_momentum = round1(rng.gen_range(3.0..10.0));
        let news_relevance = round1(rng.gen_range(3.0..10.0));
        let novelty = (rng.gen_range(0.3..1.0_f64) * 100.0).round() / 100.0;
        let relevance_score = round1(rng.gen_range(6.0..9.8));
        let mentions: u32 = rng.gen_range(500..50_000);
        let articles: u32 = rng.gen_range(5..400);

        MarketSignals {
            social_momentum,
            news_relevance,
            novelty,
            relevance_score,
            sources: serde_json::json!({
                "mode": "simulated",
                "social_mentions": mentions,
                "news_articles": articles,
            }),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl SignalSource for SimulatedSignals {
    fn fetch(&self, topic: &str) -> BoxFuture<'_, Result<MarketSignals>> {
        let signals = Self::signals_for(topic);
        Box::pin(async move { Ok(signals) })
    }
}

/// Build the configured signal source.
pub fn build_signal_source(config: &SignalsConfig) -> Arc<dyn SignalSource> {
    match config.mode {
        SignalMode::Static => Arc::new(StaticSignals::from_config(config)),
        SignalMode::Simulated => Arc::new(SimulatedSignals),
    }
}

/// Fetch signals, falling back to neutral defaults on error.
pub async fn fetch_or_default(source: &dyn SignalSource, topic: &str) -> MarketSignals {
    match source.fetch(topic).await {
        Ok(signals) => signals,
        Err(e) => {
            warn!(topic, error = %e, "Market signal fetch failed, using defaults");
            MarketSignals::default()
        }
    }
}
