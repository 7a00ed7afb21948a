//! Embeddings generation module
//!
//! This module turns product and taxonomy text into fixed-length vectors:
//! - Hash (term-frequency hashing, deterministic, no model)
//! - Neural (all-MiniLM-L6-v2 via fastembed, `neural` feature)
//! - OpenAI / Ollama (remote endpoints)
//!
//! Every vector carries the [`EmbeddingSpace`] it was produced in. Vectors
//! from different spaces are never compared.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taxomatch::config::AppConfig;
//! use taxomatch::embeddings::EmbeddingService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = EmbeddingService::new(&config)?;
//!
//!     let embedding = service.embed("Ceramic brake pads").await?;
//!     println!("{} dimensions in {}", embedding.dimension(), embedding.space());
//!
//!     Ok(())
//! }
//! ```

pub mod backfill;
pub mod client;
pub mod generator;
pub mod hash;
#[cfg(feature = "neural")]
pub mod neural;
pub mod text_preprocessing;
pub mod vector;

pub use backfill::backfill_taxonomy_embeddings;
pub use backfill::BackfillStats;
pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;
pub use generator::EmbeddingService;
pub use hash::HashEmbedder;
#[cfg(feature = "neural")]
pub use neural::NeuralModelHandle;
pub use text_preprocessing::classification_text;
pub use text_preprocessing::preprocess_text_for_embedding;

use crate::errors::Result;
use crate::errors::TaxoMatchError;

/// Identifies the model (and model parameters) a vector was produced by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddingSpace {
    pub id: String,
    pub dimension: usize,
}

impl EmbeddingSpace {
    pub fn new(id: impl Into<String>, dimension: usize) -> Self {
        Self {
            id: id.into(),
            dimension,
        }
    }

    /// Parse the `"<id>/<dimension>"` form used in storage
    pub fn parse(tag: &str) -> Option<Self> {
        let (id, dimension) = tag.rsplit_once('/')?;
        if id.is_empty() {
            return None;
        }
        Some(Self::new(id, dimension.parse().ok()?))
    }

    /// Whether a stored tag names this space
    pub fn matches_tag(&self, tag: &str) -> bool {
        Self::parse(tag).as_ref() == Some(self)
    }
}

impl std::fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.id, self.dimension)
    }
}

/// An L2-normalized vector tagged with its space
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    space: EmbeddingSpace,
    values: Vec<f32>,
}

impl Embedding {
    /// Wrap raw values; the length must equal the space dimension
    ///
    /// # Errors
    /// - `DimensionMismatch` when `values.len() != space.dimension`
    pub fn new(space: EmbeddingSpace, values: Vec<f32>) -> Result<Self> {
        if values.len() != space.dimension {
            return Err(TaxoMatchError::DimensionMismatch {
                expected: space.dimension,
                found: values.len(),
            });
        }
        Ok(Self { space, values })
    }

    /// The embedding of empty text
    pub fn zero(space: EmbeddingSpace) -> Self {
        let values = vec![0.0; space.dimension];
        Self { space, values }
    }

    pub const fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn is_zero(&self) -> bool {
        vector::is_zero(&self.values)
    }

    /// Cosine similarity to another embedding of the same space
    ///
    /// # Errors
    /// - `EmbeddingSpaceMismatch` when the spaces differ
    pub fn similarity(&self, other: &Self) -> Result<f32> {
        if self.space != other.space {
            return Err(TaxoMatchError::EmbeddingSpaceMismatch {
                expected: self.space.to_string(),
                found: other.space.to_string(),
            });
        }
        Ok(vector::dot(&self.values, &other.values))
    }

    /// Similarity to a raw stored vector already known to be in this space
    ///
    /// # Errors
    /// - `DimensionMismatch` when the stored vector has another length
    pub fn similarity_to_raw(&self, other: &[f32]) -> Result<f32> {
        if other.len() != self.values.len() {
            return Err(TaxoMatchError::DimensionMismatch {
                expected: self.values.len(),
                found: other.len(),
            });
        }
        Ok(vector::dot(&self.values, other))
    }
}

/// Configuration for embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub hash_rounds: usize,
    pub hash_decay: f32,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_text_chars: usize,
}

impl EmbeddingConfig {
    pub fn from_app_config(config: &crate::config::AppConfig) -> Self {
        let embeddings = &config.embeddings;
        // OPENAI_API_KEY is honoured when the key is not set in the file
        let api_key = embeddings.api_key.clone().or_else(|| {
            (embeddings.provider == EmbeddingProvider::OpenAI)
                .then(|| std::env::var("OPENAI_API_KEY").ok())
                .flatten()
        });

        Self {
            provider: embeddings.provider,
            model: embeddings.model.clone(),
            dimension: embeddings.dimension,
            hash_rounds: embeddings.hash_rounds,
            hash_decay: embeddings.hash_decay,
            endpoint: embeddings.endpoint.clone(),
            api_key,
            batch_size: embeddings.batch_size,
            max_text_chars: embeddings.max_text_chars,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_app_config(&crate::config::AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(id: &str) -> EmbeddingSpace {
        EmbeddingSpace::new(id, 3)
    }

    #[test]
    fn test_space_tag_round_trip() {
        let space = EmbeddingSpace::new("hash-tfidf-v1:r3:d0.5", 384);
        assert_eq!(space.to_string(), "hash-tfidf-v1:r3:d0.5/384");
        assert_eq!(EmbeddingSpace::parse(&space.to_string()), Some(space.clone()));
        assert!(space.matches_tag("hash-tfidf-v1:r3:d0.5/384"));
        assert!(!space.matches_tag("hash-tfidf-v1:r3:d0.5/768"));
        assert_eq!(EmbeddingSpace::parse("no-dimension"), None);
        assert_eq!(EmbeddingSpace::parse("/384"), None);
    }

    #[test]
    fn test_new_checks_dimension() {
        let err = Embedding::new(space("a"), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            TaxoMatchError::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn test_cross_space_similarity_rejected() {
        let a = Embedding::new(space("a"), vec![1.0, 0.0, 0.0]).unwrap();
        let b = Embedding::new(space("b"), vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            a.similarity(&b),
            Err(TaxoMatchError::EmbeddingSpaceMismatch { .. })
        ));
        assert!((a.similarity(&a).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_embedding() {
        let zero = Embedding::zero(space("a"));
        assert!(zero.is_zero());
        assert_eq!(zero.dimension(), 3);
        assert_eq!(zero.similarity_to_raw(&[1.0, 0.0, 0.0]).unwrap(), 0.0);
        assert!(zero.similarity_to_raw(&[1.0]).is_err());
    }
}
