//! Classification pipeline
//!
//! Ties the embedder, taxonomy index, classifier and cache together. The
//! single-product path ([`ClassificationPipeline::classify_one`]) uses both
//! cache tiers and a long-lived index; the batch path lives in [`batch`].

pub mod batch;

use std::sync::Arc;

pub use batch::BatchItemResult;
pub use batch::BatchOutcome;
pub use batch::BatchStats;
pub use batch::QualityStats;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::warn;

use crate::cache::CacheStore;
use crate::cache::ClassificationCache;
use crate::classifier::Classifier;
use crate::classifier::QualityBand;
use crate::config::AppConfig;
use crate::config::BatchConfig;
use crate::database::Database;
use crate::embeddings::Embedding;
use crate::embeddings::EmbeddingService;
use crate::errors::Result;
use crate::errors::TaxoMatchError;
use crate::models::ClassificationResult;
use crate::models::ProductInput;
use crate::taxonomy::TaxonomyIndex;
use crate::taxonomy::TaxonomyStore;

pub struct ClassificationPipeline {
    taxonomy_store: Arc<dyn TaxonomyStore>,
    embedder: Arc<EmbeddingService>,
    cache: Arc<ClassificationCache>,
    classifier: Classifier,
    batch_config: BatchConfig,
    index: RwLock<Option<Arc<TaxonomyIndex>>>,
}

impl ClassificationPipeline {
    pub fn new(
        taxonomy_store: Arc<dyn TaxonomyStore>,
        cache_store: Arc<dyn CacheStore>,
        embedder: Arc<EmbeddingService>,
        config: &AppConfig,
    ) -> Self {
        let cache = ClassificationCache::new(cache_store, Arc::clone(&embedder), config.cache.clone());
        Self {
            taxonomy_store,
            embedder,
            cache: Arc::new(cache),
            classifier: Classifier::new(&config.classifier),
            batch_config: config.batch.clone(),
            index: RwLock::new(None),
        }
    }

    /// Pipeline with PostgreSQL behind both the taxonomy and the cache
    ///
    /// # Errors
    /// Embedding service misconfiguration
    pub fn with_database(database: Arc<Database>, config: &AppConfig) -> Result<Self> {
        let embedder = Arc::new(EmbeddingService::new(config)?);
        let taxonomy_store: Arc<dyn TaxonomyStore> = database.clone();
        Ok(Self::new(taxonomy_store, database, embedder, config))
    }

    pub fn embedder(&self) -> &Arc<EmbeddingService> {
        &self.embedder
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn taxonomy_store(&self) -> &Arc<dyn TaxonomyStore> {
        &self.taxonomy_store
    }

    /// Reload the taxonomy used by the single-product path
    pub async fn refresh_taxonomy(&self) -> Result<Arc<TaxonomyIndex>> {
        let index = Arc::new(self.load_index().await?);
        *self.index.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// The cached index, loaded on first use
    pub async fn taxonomy(&self) -> Result<Arc<TaxonomyIndex>> {
        let cached = self.index.read().await.clone();
        match cached {
            Some(index) => Ok(index),
            None => self.refresh_taxonomy().await,
        }
    }

    async fn load_index(&self) -> Result<TaxonomyIndex> {
        TaxonomyIndex::load(self.taxonomy_store.as_ref(), self.embedder.space().clone()).await
    }

    /// Classify one product, consulting both cache tiers first
    ///
    /// # Errors
    /// - `InvalidInput` when name and description are both blank
    /// - `EmptyTaxonomy`, `NoCandidates`, `OrphanedNode` from classification
    /// - Embedding failures
    pub async fn classify_one(&self, product: &ProductInput) -> Result<ClassificationResult> {
        if product.is_blank() {
            return Err(TaxoMatchError::InvalidInput(
                "product name and description are both empty".to_string(),
            ));
        }

        let lookup = self.cache.lookup(product).await?;
        if let Some(result) = lookup.result {
            return Ok(result);
        }

        let index = self.taxonomy().await?;
        if index.is_empty() {
            return Err(TaxoMatchError::EmptyTaxonomy);
        }

        let embedding = match lookup.embedding {
            Some(embedding) => embedding,
            None => self.embedder.embed(&product.classification_text()).await?,
        };
        let result = self.compute(&embedding, &index)?;

        if let Err(e) = self
            .cache
            .store_with_embedding(product, &result, Some(&embedding))
            .await
        {
            warn!("Failed to cache classification for '{}': {}", product.name, e);
        }

        Ok(result)
    }

    fn compute(&self, embedding: &Embedding, index: &TaxonomyIndex) -> Result<ClassificationResult> {
        let matched = self.classifier.classify(embedding, index)?;
        debug!(
            "Computed {} > {} > {} ({})",
            matched.category, matched.subcategory, matched.part_type, matched.confidence
        );
        Ok(matched.into_result())
    }

    pub const fn quality_band(&self, confidence: u8) -> QualityBand {
        self.classifier.quality_band(confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::embeddings::backfill_taxonomy_embeddings;
    use crate::models::MatchProvenance;
    use crate::taxonomy::InMemoryTaxonomyStore;

    async fn pipeline() -> ClassificationPipeline {
        let taxonomy = Arc::new(InMemoryTaxonomyStore::new());
        let brakes = taxonomy.add_category("Brakes").await.unwrap();
        let pads = taxonomy.add_subcategory(brakes, "Pads").await.unwrap();
        taxonomy.add_part_type(pads, "Brake Pads").await.unwrap();
        let filters = taxonomy.add_category("Filters").await.unwrap();
        let oil = taxonomy.add_subcategory(filters, "Oil").await.unwrap();
        taxonomy.add_part_type(oil, "Oil Filter").await.unwrap();

        let embedder = Arc::new(EmbeddingService::hash(384));
        backfill_taxonomy_embeddings(taxonomy.as_ref(), &embedder)
            .await
            .unwrap();

        ClassificationPipeline::new(
            taxonomy,
            Arc::new(InMemoryCacheStore::new()),
            embedder,
            &AppConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_classify_one_computes_then_hits_cache() {
        let pipeline = pipeline().await;
        let product = ProductInput::new("Oil Filter", "Spin-on oil filter");

        let first = pipeline.classify_one(&product).await.unwrap();
        assert_eq!(first.part_type, "Oil Filter");
        assert_eq!(first.provenance, MatchProvenance::Computed);
        assert!(!first.cached());

        let second = pipeline.classify_one(&product).await.unwrap();
        assert_eq!(second.provenance, MatchProvenance::Exact);
        assert_eq!(second.part_type, first.part_type);
        assert_eq!(second.confidence, first.confidence);
    }

    #[tokio::test]
    async fn test_blank_product_rejected() {
        let pipeline = pipeline().await;
        let err = pipeline
            .classify_one(&ProductInput::new("  ", ""))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_empty_taxonomy() {
        let pipeline = ClassificationPipeline::new(
            Arc::new(InMemoryTaxonomyStore::new()),
            Arc::new(InMemoryCacheStore::new()),
            Arc::new(EmbeddingService::hash(384)),
            &AppConfig::default(),
        );
        assert!(matches!(
            pipeline.classify_one(&ProductInput::new("Brake Pads", "")).await,
            Err(TaxoMatchError::EmptyTaxonomy)
        ));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_part_types() {
        let pipeline = pipeline().await;
        assert_eq!(pipeline.taxonomy().await.unwrap().part_type_count(), 2);

        let store = pipeline.taxonomy_store();
        let lighting = store.add_category("Lighting").await.unwrap();
        let bulbs = store.add_subcategory(lighting, "Bulbs").await.unwrap();
        store.add_part_type(bulbs, "Headlight Bulb").await.unwrap();

        assert_eq!(pipeline.taxonomy().await.unwrap().part_type_count(), 2);
        assert_eq!(pipeline.refresh_taxonomy().await.unwrap().part_type_count(), 3);
    }
}
