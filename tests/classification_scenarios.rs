use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use taxomatch::config::CacheConfig;
use taxomatch::embeddings::backfill_taxonomy_embeddings;
use taxomatch::models::CacheEntry;
use taxomatch::models::CacheStoreStats;
use taxomatch::models::PartTypeRecord;
use taxomatch::models::SimilarEntry;
use taxomatch::product_hash;
use taxomatch::AppConfig;
use taxomatch::CacheStore;
use taxomatch::ClassificationCache;
use taxomatch::ClassificationPipeline;
use taxomatch::Embedding;
use taxomatch::EmbeddingService;
use taxomatch::InMemoryCacheStore;
use taxomatch::InMemoryTaxonomyStore;
use taxomatch::MatchProvenance;
use taxomatch::ProductInput;
use taxomatch::Result;
use taxomatch::TaxoMatchError;
use taxomatch::TaxonomyStore;
use tokio_util::sync::CancellationToken;

const DIMENSION: usize = 384;

async fn brake_taxonomy() -> Result<Arc<InMemoryTaxonomyStore>> {
    let taxonomy = Arc::new(InMemoryTaxonomyStore::new());
    let category = taxonomy.add_category("Brake System").await?;
    let subcategory = taxonomy
        .add_subcategory(category, "Brake Components")
        .await?;
    taxonomy.add_part_type(subcategory, "Brake Pads").await?;
    Ok(taxonomy)
}

async fn pipeline_over(
    taxonomy: Arc<InMemoryTaxonomyStore>,
) -> Result<(ClassificationPipeline, Arc<EmbeddingService>)> {
    let embedder = Arc::new(EmbeddingService::hash(DIMENSION));
    backfill_taxonomy_embeddings(taxonomy.as_ref(), &embedder).await?;
    let pipeline = ClassificationPipeline::new(
        taxonomy,
        Arc::new(InMemoryCacheStore::new()),
        Arc::clone(&embedder),
        &AppConfig::default(),
    );
    Ok((pipeline, embedder))
}

#[tokio::test]
async fn test_brake_pads_single_node_taxonomy() -> Result<()> {
    let (pipeline, _) = pipeline_over(brake_taxonomy().await?).await?;

    let product = ProductInput::new(
        "Heavy-Duty Brake Pads",
        "Ceramic brake pads for high-performance vehicles",
    );
    let result = pipeline.classify_one(&product).await?;

    assert_eq!(result.part_type, "Brake Pads");
    assert_eq!(result.subcategory, "Brake Components");
    assert_eq!(result.category, "Brake System");
    assert!(result.confidence > 0);
    assert!(result.confidence <= 100);
    assert_eq!(result.provenance, MatchProvenance::Computed);

    // Stored on the way out, so the same product is now an exact hit
    let again = pipeline.classify_one(&product).await?;
    assert_eq!(again.provenance, MatchProvenance::Exact);
    assert_eq!(again.part_type, result.part_type);
    assert_eq!(again.confidence, result.confidence);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_in_batch_embedded_once_across_runs() -> Result<()> {
    let taxonomy = brake_taxonomy().await?;
    let category = taxonomy.add_category("Engine").await?;
    let subcategory = taxonomy.add_subcategory(category, "Filters").await?;
    taxonomy.add_part_type(subcategory, "Oil Filter").await?;
    let (pipeline, embedder) = pipeline_over(taxonomy).await?;

    let batch = || {
        vec![
            ProductInput::new("Ceramic Brake Pads", "Front axle").with_id("1"),
            ProductInput::new("Spin-on Oil Filter", "M20x1.5 thread").with_id("2"),
            ProductInput::new("Ceramic Brake Pads", "Front axle").with_id("3"),
        ]
    };

    let baseline = embedder.computed_count();
    let first = pipeline
        .classify_batch(batch(), CancellationToken::new())
        .await?;
    assert_eq!(embedder.computed_count() - baseline, 2);
    assert_eq!(first.stats.total_processed, 3);
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(first.results[0].result, first.results[2].result);

    let before_second = embedder.computed_count();
    let second = pipeline
        .classify_batch(batch(), CancellationToken::new())
        .await?;
    assert_eq!(embedder.computed_count(), before_second);
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(pipeline.cache().stats().await.exact_hits, 3);
    assert_eq!(second.stats.computed, 0);
    for (fresh, cached) in first.results.iter().zip(&second.results) {
        assert_eq!(fresh.id, cached.id);
        assert_eq!(fresh.result.part_type, cached.result.part_type);
        assert_eq!(cached.result.provenance, MatchProvenance::Exact);
    }
    Ok(())
}

#[tokio::test]
async fn test_orphaned_part_type_never_matched() -> Result<()> {
    let taxonomy = brake_taxonomy().await?;
    let embedder = EmbeddingService::hash(DIMENSION);

    // Identical text to the product, so it would win if it were a candidate
    let text = "Brake Pads Ceramic";
    let orphan_vector = embedder.embed(text).await?;
    taxonomy.insert_part_type(PartTypeRecord {
        id: 1000,
        subcategory_id: 999,
        name: "Orphaned Pads".to_string(),
        embedding: Some(orphan_vector.values().to_vec()),
        embedding_space: Some(orphan_vector.space().to_string()),
    })?;

    let (pipeline, _) = pipeline_over(taxonomy).await?;
    let index = pipeline.refresh_taxonomy().await?;
    assert_eq!(index.orphan_count(), 1);

    let result = pipeline
        .classify_one(&ProductInput::new("Brake Pads", "Ceramic"))
        .await?;
    assert_eq!(result.part_type, "Brake Pads");
    Ok(())
}

#[tokio::test]
async fn test_similarity_tier_through_pipeline() -> Result<()> {
    let (pipeline, _) = pipeline_over(brake_taxonomy().await?).await?;

    pipeline
        .classify_one(&ProductInput::new("Ceramic Brake Pads", "Front axle"))
        .await?;

    // Different hash, same tokens
    let near = pipeline
        .classify_one(&ProductInput::new("Ceramic Brake-Pads!", "Front axle."))
        .await?;
    assert!(matches!(near.provenance, MatchProvenance::Similar { similarity } if similarity >= 85));
    assert_eq!(near.part_type, "Brake Pads");

    let far = pipeline
        .classify_one(&ProductInput::new("Windshield wiper blade", "22 inch"))
        .await?;
    assert_eq!(far.provenance, MatchProvenance::Computed);
    Ok(())
}

/// Cache store whose second `get_many` call fails
struct FlakyStore {
    inner: InMemoryCacheStore,
    get_many_calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, product_hash: &str) -> Result<Option<CacheEntry>> {
        self.inner.get(product_hash).await
    }

    async fn get_many(&self, product_hashes: &[String]) -> Result<Vec<CacheEntry>> {
        let call = self.get_many_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 2 {
            return Err(TaxoMatchError::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.get_many(product_hashes).await
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.inner.upsert(entry).await
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarEntry>> {
        self.inner.find_similar(embedding, threshold, limit).await
    }

    async fn record_usage(&self, product_hashes: &[String]) -> Result<()> {
        self.inner.record_usage(product_hashes).await
    }

    async fn stats(&self) -> Result<CacheStoreStats> {
        self.inner.stats().await
    }
}

fn entry_for(product: &ProductInput) -> CacheEntry {
    let now = Utc::now();
    CacheEntry {
        product_hash: product_hash(&product.name, &product.description),
        product_name: product.name.clone(),
        product_description: product.description.clone(),
        suggested_category: "Brake System".to_string(),
        suggested_subcategory: "Brake Components".to_string(),
        suggested_parttype: "Brake Pads".to_string(),
        confidence: 42,
        validation_reason: None,
        embedding: None,
        embedding_space: None,
        usage_count: 0,
        last_used_at: now,
        created_at: now,
    }
}

#[tokio::test]
async fn test_chunked_lookup_survives_failed_middle_chunk() -> Result<()> {
    let products: Vec<ProductInput> = (0..1200)
        .map(|i| ProductInput::new(format!("Part {i}"), "catalog item"))
        .collect();

    let store = Arc::new(FlakyStore {
        inner: InMemoryCacheStore::new(),
        get_many_calls: AtomicUsize::new(0),
    });
    for product in &products {
        store.inner.upsert(&entry_for(product)).await?;
    }

    let config = CacheConfig {
        lookup_chunk_size: 500,
        ..CacheConfig::default()
    };
    let cache = ClassificationCache::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        Arc::new(EmbeddingService::hash(DIMENSION)),
        config,
    );

    let found = cache.batch_lookup(&products).await;

    assert_eq!(store.get_many_calls.load(Ordering::SeqCst), 3);
    assert_eq!(found.len(), 700);
    for (i, product) in products.iter().enumerate() {
        let hash = product_hash(&product.name, &product.description);
        let in_failed_chunk = (500..1000).contains(&i);
        assert_eq!(found.contains_key(&hash), !in_failed_chunk, "product {i}");
    }

    let stats = cache.stats().await;
    assert_eq!(stats.chunk_failures, 1);
    assert_eq!(stats.exact_hits, 700);
    assert_eq!(stats.misses, 500);
    Ok(())
}

/// Cache store that is unreachable for every operation
struct UnreachableStore;

fn unreachable() -> TaxoMatchError {
    TaxoMatchError::StoreUnavailable("connection refused".to_string())
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _product_hash: &str) -> Result<Option<CacheEntry>> {
        Err(unreachable())
    }

    async fn get_many(&self, _product_hashes: &[String]) -> Result<Vec<CacheEntry>> {
        Err(unreachable())
    }

    async fn upsert(&self, _entry: &CacheEntry) -> Result<()> {
        Err(unreachable())
    }

    async fn find_similar(
        &self,
        _embedding: &Embedding,
        _threshold: f32,
        _limit: usize,
    ) -> Result<Vec<SimilarEntry>> {
        Err(unreachable())
    }

    async fn record_usage(&self, _product_hashes: &[String]) -> Result<()> {
        Err(unreachable())
    }

    async fn stats(&self) -> Result<CacheStoreStats> {
        Err(unreachable())
    }
}

#[tokio::test]
async fn test_unreachable_cache_never_blocks_classification() -> Result<()> {
    let taxonomy = brake_taxonomy().await?;
    let embedder = Arc::new(EmbeddingService::hash(DIMENSION));
    backfill_taxonomy_embeddings(taxonomy.as_ref(), &embedder).await?;
    let pipeline = ClassificationPipeline::new(
        taxonomy,
        Arc::new(UnreachableStore),
        embedder,
        &AppConfig::default(),
    );

    let single = pipeline
        .classify_one(&ProductInput::new("Ceramic Brake Pads", "Front axle"))
        .await?;
    assert_eq!(single.provenance, MatchProvenance::Computed);
    assert_eq!(single.part_type, "Brake Pads");

    let outcome = pipeline
        .classify_batch(
            vec![
                ProductInput::new("Semi-metallic Brake Pads", "Rear axle").with_id("1"),
                ProductInput::new("Brake Pad Set", "Low dust").with_id("2"),
            ],
            CancellationToken::new(),
        )
        .await?;
    assert_eq!(outcome.stats.total_processed, 2);
    assert_eq!(outcome.stats.computed, 2);
    assert_eq!(outcome.stats.cache_hits, 0);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.result.provenance == MatchProvenance::Computed));

    let stats = pipeline.cache().stats().await;
    assert_eq!(stats.write_failures, 3);
    assert_eq!(stats.chunk_failures, 1);
    assert_eq!(stats.writes, 0);
    assert!(pipeline.cache().store_stats().await.is_err());
    Ok(())
}

/// In-memory store whose usage tracking always fails
struct NoUsageTrackingStore {
    inner: InMemoryCacheStore,
}

#[async_trait]
impl CacheStore for NoUsageTrackingStore {
    async fn get(&self, product_hash: &str) -> Result<Option<CacheEntry>> {
        self.inner.get(product_hash).await
    }

    async fn get_many(&self, product_hashes: &[String]) -> Result<Vec<CacheEntry>> {
        self.inner.get_many(product_hashes).await
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.inner.upsert(entry).await
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarEntry>> {
        self.inner.find_similar(embedding, threshold, limit).await
    }

    async fn record_usage(&self, _product_hashes: &[String]) -> Result<()> {
        Err(unreachable())
    }

    async fn stats(&self) -> Result<CacheStoreStats> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn test_usage_tracking_failure_keeps_exact_hit() -> Result<()> {
    let store = Arc::new(NoUsageTrackingStore {
        inner: InMemoryCacheStore::new(),
    });
    let product = ProductInput::new("Ceramic Brake Pads", "Front axle");
    store.inner.upsert(&entry_for(&product)).await?;

    let cache = ClassificationCache::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        Arc::new(EmbeddingService::hash(DIMENSION)),
        CacheConfig::default(),
    );

    let hit = cache.lookup(&product).await?.result;
    let hit = hit.ok_or_else(|| TaxoMatchError::InvalidInput("expected a cache hit".to_string()))?;
    assert_eq!(hit.provenance, MatchProvenance::Exact);
    assert_eq!(hit.part_type, "Brake Pads");
    assert_eq!(hit.confidence, 42);

    let found = cache.batch_lookup(std::slice::from_ref(&product)).await;
    assert_eq!(found.len(), 1);

    let stats = cache.stats().await;
    assert_eq!(stats.exact_hits, 2);
    assert_eq!(stats.misses, 0);
    Ok(())
}
