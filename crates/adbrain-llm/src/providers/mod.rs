pub mod gemini;
pub mod huggingface;
pub mod openai;
pub mod presets;

pub use gemini::GeminiClient;
pub use huggingface::HuggingFaceClient;
pub use openai::OpenAiCompatClient;

/// Capitalized provider name for failure messages ("mistral" → "Mistral").
pub(crate) fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Failure text for a provider that has no credential.
pub(crate) fn missing_key(name: &str) -> String {
    format!("{} API key not available", display_name(name))
}
