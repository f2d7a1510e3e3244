use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use adbrain_core::config::ProviderConfig;
use adbrain_core::traits::GenerationProvider;
use adbrain_core::types::{FailureKind, ProviderReply};

use super::missing_key;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini native API client (`generateContent`).
pub struct GeminiClient {
    http: Client,
    config: ProviderConfig,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn url(&self, api_key: &str) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(GEMINI_API_BASE);
        format!(
            "{}/{}:generateContent?key={}",
            base.trim_end_matches('/'),
            self.config.model_id,
            api_key
        )
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(resp: GeminiResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

impl GenerationProvider for GeminiClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderReply> {
        Box::pin(async move {
            let Some(api_key) = self.config.resolved_api_key() else {
                return ProviderReply::unavailable(missing_key(&self.config.name));
            };

            let body = GeminiRequest {
                contents: vec![GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart { text: &prompt }],
                }],
                generation_config: GenerationConfig {
                    max_output_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                },
            };

            let response = match self
                .http
                .post(self.url(api_key))
                .header("content-type", "application/json")
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

            match response.json::<GeminiResponse>().await {
                Ok(resp) => match extract_text(resp) {
                    Some(text) => ProviderReply::text(text),
                    None => ProviderReply::failure(
                        FailureKind::Transport,
                        "Error: Gemini returned no candidates",
                    ),
                },
                Err(e) => ProviderReply::failure(FailureKind::Transport, format!("Error: {}", e)),
            }
        })
    }
}
