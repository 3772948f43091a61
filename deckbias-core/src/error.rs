use thiserror::Error;

/// All errors produced by deckbias-core.
///
/// Malformed seed or LLM payloads are deliberately absent: the consolidator
/// treats them as "no contribution" and reports through its stats instead.
#[derive(Debug, Error)]
pub enum DeckBiasError {
    #[error("unsupported source format '{extension}': {path}")]
    UnsupportedFormat {
        path: std::path::PathBuf,
        extension: String,
    },

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DeckBiasError>;
