use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AdbrainError, Result};

/// Top-level AdBrain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Generation providers. Empty means the built-in default chain.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Per-provider-call timeout used when a provider does not set its own.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Failure sentinels used when a provider does not set its own.
    #[serde(default = "default_failure_sentinels")]
    pub failure_sentinels: Vec<String>,
    /// Runtime logging configuration.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            default_timeout_secs: default_timeout_secs(),
            failure_sentinels: default_failure_sentinels(),
            log: None,
        }
    }
}

fn default_workspace() -> String {
    "~/.adbrain".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Substrings that mark a provider reply as a failure.
pub fn default_failure_sentinels() -> Vec<String> {
    vec!["Error:".to_string(), "not available".to_string()]
}

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Verbosity: 1=run summary, 2=per node, 3=per provider attempt.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_level() -> u8 {
    2
}

/// Campaign archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,
    /// SQLite database path. Default: <workspace>/campaigns.db
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            path: None,
        }
    }
}

fn default_storage_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// Fixed values from this config section.
    Static,
    /// Deterministic per-topic simulated market data.
    #[default]
    Simulated,
}

/// Market signal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default)]
    pub mode: SignalMode,
    #[serde(default = "default_momentum")]
    pub social_momentum: f64,
    #[serde(default = "default_momentum")]
    pub news_relevance: f64,
    #[serde(default = "default_novelty")]
    pub novelty: f64,
    #[serde(default = "default_relevance_score")]
    pub relevance_score: f64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            mode: SignalMode::default(),
            social_momentum: default_momentum(),
            news_relevance: default_momentum(),
            novelty: default_novelty(),
            relevance_score: default_relevance_score(),
        }
    }
}

fn default_momentum() -> f64 {
    5.0
}

fn default_novelty() -> f64 {
    0.5
}

fn default_relevance_score() -> f64 {
    8.0
}

/// One entry of the provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Adapter to use ("gemini", "huggingface", or any OpenAI-compatible preset).
    /// Defaults to `name`.
    #[serde(default)]
    pub provider: Option<String>,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Lower ranks are tried first.
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub failure_sentinels: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            priority: 0,
            failure_sentinels: None,
            timeout_secs: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// The adapter kind for this provider.
    pub fn provider_kind(&self) -> &str {
        self.provider.as_deref().unwrap_or(&self.name)
    }

    /// The credential, if one is actually set.
    ///
    /// Empty strings and unexpanded `${VAR}` references count as missing.
    pub fn resolved_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with("${"))
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| AdbrainError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| AdbrainError::Config(e.to_string()))
    }

    /// Load config from a file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Providers in the chain: the configured ones, or the default
    /// gemini → mistral → huggingface chain with keys from the environment.
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        if !self.providers.is_empty() {
            return self.providers.clone();
        }
        vec![
            ProviderConfig::new("gemini", "gemini-1.5-flash")
                .with_api_key(std::env::var("GEMINI_API_KEY").ok())
                .with_priority(0),
            ProviderConfig::new("mistral", "mistral-small-latest")
                .with_api_key(std::env::var("MISTRAL_API_KEY").ok())
                .with_priority(1),
            ProviderConfig::new("huggingface", "mistralai/Mistral-7B-Instruct-v0.1")
                .with_api_key(std::env::var("HUGGINGFACE_API_TOKEN").ok())
                .with_priority(2),
        ]
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.engine.workspace)
    }

    /// Directory for JSONL run logs.
    pub fn log_dir(&self) -> PathBuf {
        match self.engine.log.as_ref().and_then(|l| l.log_dir.as_deref()) {
            Some(dir) => expand_home(dir),
            None => self.workspace_dir().join("logs"),
        }
    }

    /// Path of the campaign archive database.
    pub fn storage_path(&self) -> PathBuf {
        match self.storage.path.as_deref() {
            Some(path) => expand_home(path),
            None => self.workspace_dir().join("campaigns.db"),
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    warn!(var = %var_name, "Config references an unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
