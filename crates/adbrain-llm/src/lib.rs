pub mod chain;
pub mod providers;

use std::sync::Arc;

use adbrain_core::config::ProviderConfig;
use adbrain_core::traits::GenerationProvider;

pub use chain::{build_chain, ChainResult, ProviderChain, ProviderDescriptor};
pub use providers::gemini::GeminiClient;
pub use providers::huggingface::HuggingFaceClient;
pub use providers::openai::OpenAiCompatClient;

/// Create a generation provider based on the configured adapter kind.
pub fn create_provider(config: &ProviderConfig) -> Arc<dyn GenerationProvider> {
    match config.provider_kind() {
        "gemini" | "google" => Arc::new(GeminiClient::new(config.clone())),
        "huggingface" | "hf" => Arc::new(HuggingFaceClient::new(config.clone())),
        // Everything else uses the OpenAI-compatible client
        _ => Arc::new(OpenAiCompatClient::new(config.clone())),
    }
}
