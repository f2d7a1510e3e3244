use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdbrainError {
    // Provider errors
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider request failed: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    // Structural graph errors
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    // Node errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    // Market data errors
    #[error("Signal source error: {0}")]
    Signals(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdbrainError {
    /// Structural errors abort a run before any node executes.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnknownNode(_) | Self::InvalidGraph(_) | Self::GraphNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdbrainError>;
