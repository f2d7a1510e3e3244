use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use adbrain_core::config::ProviderConfig;
use adbrain_core::traits::GenerationProvider;
use adbrain_core::types::{FailureKind, ProviderReply};

use super::missing_key;
use super::presets::{get_preset, OPENAI_API_URL};

/// OpenAI-compatible chat completions client. Works with OpenAI, Mistral,
/// Groq, OpenRouter, Ollama, etc.
pub struct OpenAiCompatClient {
    http: Client,
    config: ProviderConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> (String, bool) {
        let preset = get_preset(self.config.provider_kind());
        let needs_key = preset.as_ref().map(|p| p.needs_api_key).unwrap_or(true);
        let url = self
            .config
            .base_url
            .clone()
            .or_else(|| preset.map(|p| p.default_base_url.to_string()))
            .unwrap_or_else(|| OPENAI_API_URL.to_string());
        (url, needs_key)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a chat completions body.
fn extract_content(body: serde_json::Value) -> serde_json::Value {
    match serde_json::from_value::<ChatResponse>(body.clone()) {
        Ok(resp) => match resp.choices.into_iter().next().and_then(|c| c.message.content) {
            Some(text) => serde_json::Value::String(text),
            None => serde_json::Value::String(body.to_string()),
        },
        Err(_) => serde_json::Value::String(body.to_string()),
    }
}

impl GenerationProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderReply> {
        Box::pin(async move {
            let (url, needs_key) = self.endpoint();
            let api_key = self.config.resolved_api_key();
            if needs_key && api_key.is_none() {
                return ProviderReply::unavailable(missing_key(&self.config.name));
            }

            let body = ChatRequest {
                model: &self.config.model_id,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let mut req = self.http.post(&url).json(&body);
            if let Some(key) = api_key {
                req = req.header("Authorization", format!("Bearer {}", key));
            }

            let response = match req.send().await {
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
                Ok(body) => ProviderReply::Ok(extract_content(body)),
                Err(e) => ProviderReply::failure(FailureKind::Transport, format!("Error: {}", e)),
            }
        })
    }
}
