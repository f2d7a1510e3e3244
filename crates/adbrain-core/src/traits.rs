use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Generation backend. Turns a prompt into text or structured output.
///
/// Implementations never fail with `Err`: transport problems, missing
/// credentials, and error bodies are all reported as `ProviderReply::Failure`.
pub trait GenerationProvider: Send + Sync + 'static {
    /// Provider name (used in logs and `provider_used`).
    fn name(&self) -> &str;

    /// Generate a reply for the prompt.
    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderReply>;
}

/// Market data provider.
pub trait SignalSource: Send + Sync + 'static {
    /// Fetch signals for a campaign topic.
    fn fetch(&self, topic: &str) -> BoxFuture<'_, Result<MarketSignals>>;
}

/// Long-term storage for finished campaigns.
pub trait CampaignArchive: Send + Sync + 'static {
    /// Persist a campaign snapshot, returning the stored campaign id.
    fn archive(&self, campaign: ArchivedCampaign) -> BoxFuture<'_, Result<String>>;
}
