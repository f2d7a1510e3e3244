use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use adbrain_core::config::ProviderConfig;
use adbrain_core::traits::GenerationProvider;
use adbrain_core::types::{FailureKind, ProviderReply};

use super::missing_key;

const HF_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";

/// Hugging Face Inference API client for text-generation models.
pub struct HuggingFaceClient {
    http: Client,
    config: ProviderConfig,
}

impl HuggingFaceClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        match &self.config.base_url {
            Some(url) => url.clone(),
            None => format!("{}/{}", HF_INFERENCE_BASE, self.config.model_id),
        }
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Serialize)]
struct InferenceParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
}

/// The inference API echoes the prompt at the start of `generated_text`.
fn strip_prompt(body: serde_json::Value, prompt: &str) -> serde_json::Value {
    let generated = body
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("generated_text"))
        .and_then(|t| t.as_str());
    match generated {
        Some(text) => serde_json::Value::String(text.replace(prompt, "").trim().to_string()),
        None => serde_json::Value::String(body.to_string()),
    }
}

impl GenerationProvider for HuggingFaceClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderReply> {
        Box::pin(async move {
            let Some(api_key) = self.config.resolved_api_key() else {
                return ProviderReply::unavailable(missing_key(&self.config.name));
            };

            let body = InferenceRequest {
                inputs: &prompt,
                parameters: InferenceParameters {
                    max_new_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                    top_p: 0.9,
                },
            };

            let response = match self
                .http
                .post(self.url())
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(provider = %self.config.name, error = %e, "Request failed");
                    return ProviderReply::failure(FailureKind::Transport, format!("Error: {}", e));
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                warn!(provider = %self.config.name, %status, body = %text, "API error");
                return ProviderReply::failure(
                    FailureKind::Transport,
                    format!("API Error: {}", status.as_u16()),
                );
            }

            match response.json::<serde_json::Value>().await {
                Ok(body) => ProviderReply::Ok(strip_prompt(body, &prompt)),
                Err(e) => ProviderReply::failure(FailureKind::Transport, format!("Error: {}", e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prompt() {
        let body = serde_json::json!([{"generated_text": "Write a tagline. Fashion that breathes."}]);
        assert_eq!(
            strip_prompt(body, "Write a tagline."),
            serde_json::json!("Fashion that breathes.")
        );
    }

    #[test]
    fn test_strip_prompt_unexpected_shape() {
        let body = serde_json::json!({"error": "Model is loading"});
        let out = strip_prompt(body, "p");
        assert!(out.as_str().unwrap().contains("Model is loading"));
    }

    #[test]
    fn test_default_url() {
        let client = HuggingFaceClient::new(ProviderConfig::new(
            "huggingface",
            "mistralai/Mistral-7B-Instruct-v0.1",
        ));
        assert_eq!(
            client.url(),
            "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.1"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let client = HuggingFaceClient::new(ProviderConfig::new("huggingface", "gpt2"));
        assert_eq!(
            client.generate("p".into()).await,
            ProviderReply::unavailable("Huggingface API key not available")
        );
    }
}
