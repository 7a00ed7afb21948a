use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxoMatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding model failed to load: {0}")]
    ModelLoad(String),

    #[error("Embedding space mismatch: expected {expected}, found {found}")]
    EmbeddingSpaceMismatch { expected: String, found: String },

    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Taxonomy is empty: no part types available for matching")]
    EmptyTaxonomy,

    #[error("No part type has a usable embedding")]
    NoCandidates,

    #[error("Orphaned taxonomy node: {0}")]
    OrphanedNode(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("{0}")]
    Custom(String),
}

impl TaxoMatchError {
    /// Whether the error was caused by the caller rather than by the service
    /// or one of its backends.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Whether the error means a backing store could not be reached.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, TaxoMatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_contains_details() {
        let err = TaxoMatchError::DimensionMismatch {
            expected: 384,
            found: 768,
        };
        let display = err.to_string();
        assert!(display.contains("384"));
        assert!(display.contains("768"));

        let err = TaxoMatchError::EmbeddingSpaceMismatch {
            expected: "hash-tfidf-v1/384".to_string(),
            found: "neural:all-minilm-l6-v2/384".to_string(),
        };
        assert!(err.to_string().contains("neural:all-minilm-l6-v2/384"));
    }

    #[test]
    fn test_client_and_unavailable_classification() {
        assert!(TaxoMatchError::InvalidInput("missing products".into()).is_client_error());
        assert!(!TaxoMatchError::EmptyTaxonomy.is_client_error());
        assert!(TaxoMatchError::StoreUnavailable("timeout".into()).is_unavailable());
        assert!(!TaxoMatchError::NoCandidates.is_unavailable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml");
        let err: TaxoMatchError = io_err.into();
        assert!(matches!(err, TaxoMatchError::Io(_)));
    }
}
