//! Embedding generation service with batch processing

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::client::EmbeddingClient;
use super::client::EmbeddingProvider;
use super::hash::HashEmbedder;
#[cfg(feature = "neural")]
use super::neural::NeuralModelHandle;
use super::preprocess_text_for_embedding;
use super::vector::l2_normalize;
use super::Embedding;
use super::EmbeddingConfig;
use super::EmbeddingSpace;
use crate::errors::Result;
use crate::errors::TaxoMatchError;

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

enum Backend {
    Hash(HashEmbedder),
    Remote(Arc<EmbeddingClient>),
    #[cfg(feature = "neural")]
    Neural(Arc<NeuralModelHandle>),
}

/// Service for generating embeddings in a single, fixed embedding space
pub struct EmbeddingService {
    backend: Backend,
    space: EmbeddingSpace,
    config: EmbeddingConfig,
    computed: AtomicU64,
}

impl EmbeddingService {
    /// Create a new embedding service
    ///
    /// # Errors
    /// - Remote provider with an invalid endpoint
    /// - `neural` provider without the `neural` feature, or with a dimension other than 384
    pub fn new(config: &crate::config::AppConfig) -> Result<Self> {
        Self::from_config(EmbeddingConfig::from_app_config(config))
    }

    /// Create from custom config
    ///
    /// A neural service created this way owns its model handle. Use
    /// [`EmbeddingService::with_neural_model`] to share one model between services.
    pub fn from_config(config: EmbeddingConfig) -> Result<Self> {
        match config.provider {
            EmbeddingProvider::Hash => {
                let embedder =
                    HashEmbedder::new(config.dimension, config.hash_rounds, config.hash_decay);
                let space = EmbeddingSpace::new(embedder.space_id(), config.dimension);
                Ok(Self::with_backend(Backend::Hash(embedder), space, config))
            }
            EmbeddingProvider::OpenAI | EmbeddingProvider::Ollama => {
                let endpoint = config.endpoint.clone().unwrap_or_else(|| {
                    if config.provider == EmbeddingProvider::OpenAI {
                        DEFAULT_OPENAI_ENDPOINT.to_string()
                    } else {
                        DEFAULT_OLLAMA_ENDPOINT.to_string()
                    }
                });
                let client = EmbeddingClient::new(
                    config.provider,
                    config.model.clone(),
                    &endpoint,
                    config.api_key.clone(),
                )?;
                let space = EmbeddingSpace::new(
                    format!("{}:{}", config.provider, config.model),
                    config.dimension,
                );
                Ok(Self::with_backend(
                    Backend::Remote(Arc::new(client)),
                    space,
                    config,
                ))
            }
            #[cfg(feature = "neural")]
            EmbeddingProvider::Neural => {
                Self::with_neural_model(config, Arc::new(NeuralModelHandle::new()))
            }
            #[cfg(not(feature = "neural"))]
            EmbeddingProvider::Neural => Err(TaxoMatchError::ConfigError(
                "the neural embedding provider requires building with the `neural` feature"
                    .to_string(),
            )),
        }
    }

    /// Create a neural service backed by a shared model handle
    #[cfg(feature = "neural")]
    pub fn with_neural_model(
        mut config: EmbeddingConfig,
        handle: Arc<NeuralModelHandle>,
    ) -> Result<Self> {
        use super::neural::NEURAL_DIMENSION;
        use super::neural::NEURAL_MODEL_ID;

        if config.dimension != NEURAL_DIMENSION {
            return Err(TaxoMatchError::ConfigError(format!(
                "neural provider produces {NEURAL_DIMENSION}-dimensional vectors, configured dimension is {}",
                config.dimension
            )));
        }
        config.provider = EmbeddingProvider::Neural;
        let space = EmbeddingSpace::new(format!("neural:{NEURAL_MODEL_ID}"), NEURAL_DIMENSION);
        Ok(Self::with_backend(Backend::Neural(handle), space, config))
    }

    /// Hash embedder with default parameters, mostly for tests and tooling
    pub fn hash(dimension: usize) -> Self {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hash,
            dimension,
            ..EmbeddingConfig::default()
        };
        let embedder = HashEmbedder::new(dimension, config.hash_rounds, config.hash_decay);
        let space = EmbeddingSpace::new(embedder.space_id(), dimension);
        Self::with_backend(Backend::Hash(embedder), space, config)
    }

    fn with_backend(backend: Backend, space: EmbeddingSpace, config: EmbeddingConfig) -> Self {
        info!(
            "Embedding service ready: provider={}, space={}",
            config.provider, space
        );
        Self {
            backend,
            space,
            config,
            computed: AtomicU64::new(0),
        }
    }

    /// Embed one text. Empty or whitespace-only text yields the zero vector.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let Some(processed) = preprocess_text_for_embedding(text, self.text_budget()) else {
            return Ok(Embedding::zero(self.space.clone()));
        };

        let mut vectors = self.compute(vec![processed]).await?;
        let values = vectors
            .pop()
            .ok_or_else(|| TaxoMatchError::EmbeddingError("Provider returned no vector".into()))?;
        self.finish(values)
    }

    /// Embed many texts, preserving input order
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let budget = self.text_budget();
        let processed: Vec<Option<String>> = texts
            .iter()
            .map(|text| preprocess_text_for_embedding(text, budget))
            .collect();
        let pending: Vec<String> = processed.iter().flatten().cloned().collect();

        let mut computed = Vec::with_capacity(pending.len());
        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            debug!("Embedding chunk of {} texts", chunk.len());
            computed.extend(self.compute(chunk.to_vec()).await?);
        }
        if computed.len() != pending.len() {
            return Err(TaxoMatchError::EmbeddingError(format!(
                "Provider returned {} vectors for {} texts",
                computed.len(),
                pending.len()
            )));
        }

        // Zero vectors go back into the positions of empty texts
        let mut computed = computed.into_iter();
        let mut embeddings = Vec::with_capacity(texts.len());
        for entry in processed {
            let embedding = if entry.is_some() {
                let values = computed.next().ok_or_else(|| {
                    TaxoMatchError::EmbeddingError("Provider returned too few vectors".to_string())
                })?;
                self.finish(values)?
            } else {
                Embedding::zero(self.space.clone())
            };
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    async fn compute(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let count = texts.len() as u64;
        let vectors = match &self.backend {
            Backend::Hash(embedder) => texts.iter().map(|t| embedder.embed(t)).collect(),
            Backend::Remote(client) => client.generate_batch(&texts).await?,
            #[cfg(feature = "neural")]
            Backend::Neural(handle) => handle.embed_batch(texts).await?,
        };
        self.computed.fetch_add(count, Ordering::Relaxed);
        Ok(vectors)
    }

    fn finish(&self, mut values: Vec<f32>) -> Result<Embedding> {
        l2_normalize(&mut values);
        Embedding::new(self.space.clone(), values)
    }

    /// The hash embedder reads the whole text; model providers get a bounded input
    fn text_budget(&self) -> usize {
        match self.backend {
            Backend::Hash(_) => usize::MAX,
            _ => self.config.max_text_chars,
        }
    }

    pub const fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.space.dimension
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    #[must_use]
    pub const fn provider(&self) -> EmbeddingProvider {
        self.config.provider
    }

    /// Number of non-empty texts sent to the provider since creation
    pub fn computed_count(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::vector::l2_norm;

    #[tokio::test]
    async fn test_empty_text_handling() {
        let service = EmbeddingService::hash(384);
        let embedding = service.embed("   \n ").await.unwrap();
        assert_eq!(embedding.dimension(), 384);
        assert!(embedding.is_zero());
        assert_eq!(service.computed_count(), 0);
    }

    #[tokio::test]
    async fn test_embedding_is_normalized_and_deterministic() {
        let service = EmbeddingService::hash(384);
        let a = service.embed("Heavy-Duty Brake Pads").await.unwrap();
        let b = service.embed("Heavy-Duty Brake Pads").await.unwrap();
        assert_eq!(a, b);
        assert!((l2_norm(a.values()) - 1.0).abs() < 1e-5);
        assert_eq!(service.computed_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_blanks() {
        let mut config = EmbeddingConfig::default();
        config.batch_size = 2;
        let service = EmbeddingService::from_config(config).unwrap();

        let texts = ["oil filter", "", "brake pads", "  ", "spark plug"];
        let batch = service.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert!(batch[1].is_zero());
        assert!(batch[3].is_zero());
        assert_eq!(batch[2], service.embed("brake pads").await.unwrap());
        assert_eq!(batch[4], service.embed("spark plug").await.unwrap());
        // 3 in the batch plus the 2 single calls above
        assert_eq!(service.computed_count(), 5);
    }

    #[test]
    fn test_space_reflects_hash_parameters() {
        let service = EmbeddingService::hash(128);
        assert_eq!(service.space().to_string(), "hash-tfidf-v1:r3:d0.5/128");
        assert_eq!(service.dimension(), 128);
        assert_eq!(service.provider(), EmbeddingProvider::Hash);
    }

    #[cfg(not(feature = "neural"))]
    #[test]
    fn test_neural_requires_feature() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Neural,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            EmbeddingService::from_config(config),
            Err(TaxoMatchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_remote_space_names_model() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            ..EmbeddingConfig::default()
        };
        let service = EmbeddingService::from_config(config).unwrap();
        assert_eq!(service.space().to_string(), "ollama:nomic-embed-text/768");
    }
}
