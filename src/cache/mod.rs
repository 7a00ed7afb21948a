//! Classification cache
//!
//! Two tiers in front of the classifier:
//! - exact: keyed by a hash of the normalized product text
//! - similar: nearest cached product by embedding, above a threshold
//!
//! The cache never fails a classification. Store errors are logged and read
//! as a miss; write-back errors are logged and counted.

pub mod store;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
pub use store::CacheStore;
pub use store::InMemoryCacheStore;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::CacheConfig;
use crate::embeddings::Embedding;
use crate::embeddings::EmbeddingService;
use crate::errors::Result;
use crate::models::CacheEntry;
use crate::models::CacheStoreStats;
use crate::models::ClassificationResult;
use crate::models::MatchProvenance;
use crate::models::ProductInput;

/// Content address of a product: SHA-256 of the lowercased, trimmed name and
/// description joined by one space, as lowercase hex
pub fn product_hash(name: &str, description: &str) -> String {
    let normalized = format!(
        "{} {}",
        name.trim().to_lowercase(),
        description.trim().to_lowercase()
    );
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// In-process counters
///
/// Hits and misses count request rows: a product repeated inside one batch
/// counts once per occurrence, matching `BatchStats::cache_hits`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub chunk_failures: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.similar_hits
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Result of a single-product lookup
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: Option<ClassificationResult>,
    /// Query embedding, when the similarity tier had to compute it
    pub embedding: Option<Embedding>,
}

impl CacheLookup {
    const fn miss(embedding: Option<Embedding>) -> Self {
        Self {
            result: None,
            embedding,
        }
    }
}

pub struct ClassificationCache {
    store: Arc<dyn CacheStore>,
    embedder: Arc<EmbeddingService>,
    config: CacheConfig,
    stats: Arc<RwLock<CacheStats>>,
}

impl ClassificationCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        embedder: Arc<EmbeddingService>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Look a product up in the exact tier, then the similarity tier
    ///
    /// # Errors
    /// - Embedding failures while computing the similarity-tier query. Store
    ///   failures never surface here.
    pub async fn lookup(&self, product: &ProductInput) -> Result<CacheLookup> {
        let hash = product_hash(&product.name, &product.description);

        match self.store.get(&hash).await {
            Ok(Some(entry)) if entry.is_valid() => {
                debug!("Exact cache hit for {}", hash);
                self.bump_usage(vec![hash]).await;
                self.stats.write().await.exact_hits += 1;
                return Ok(CacheLookup {
                    result: Some(ClassificationResult::from_cache_entry(
                        &entry,
                        MatchProvenance::Exact,
                    )),
                    embedding: None,
                });
            }
            Ok(_) => {}
            Err(e) => warn!("Cache lookup failed for {}, treating as miss: {}", hash, e),
        }

        if !self.config.similarity_search {
            self.stats.write().await.misses += 1;
            return Ok(CacheLookup::miss(None));
        }

        let embedding = self.embedder.embed(&product.classification_text()).await?;
        if embedding.is_zero() {
            self.stats.write().await.misses += 1;
            return Ok(CacheLookup::miss(Some(embedding)));
        }

        match self
            .store
            .find_similar(&embedding, self.config.similarity_threshold, 1)
            .await
        {
            Ok(matches) => {
                if let Some(best) = matches.into_iter().find(|m| m.entry.is_valid()) {
                    let similarity = (best.similarity * 100.0).round().clamp(0.0, 100.0) as u8;
                    debug!(
                        "Similar cache hit for {} via {} ({}%)",
                        hash, best.entry.product_hash, similarity
                    );
                    self.bump_usage(vec![best.entry.product_hash.clone()]).await;
                    self.stats.write().await.similar_hits += 1;
                    return Ok(CacheLookup {
                        result: Some(ClassificationResult::from_cache_entry(
                            &best.entry,
                            MatchProvenance::Similar { similarity },
                        )),
                        embedding: Some(embedding),
                    });
                }
            }
            Err(e) => warn!("Similarity lookup failed for {}, treating as miss: {}", hash, e),
        }

        self.stats.write().await.misses += 1;
        Ok(CacheLookup::miss(Some(embedding)))
    }

    /// Embed the product and write its classification back
    pub async fn store_result(
        &self,
        product: &ProductInput,
        result: &ClassificationResult,
    ) -> Result<()> {
        let embedding = self.embedder.embed(&product.classification_text()).await?;
        self.store_with_embedding(product, result, Some(&embedding))
            .await
    }

    /// Write a classification back, reusing an already computed embedding
    pub async fn store_with_embedding(
        &self,
        product: &ProductInput,
        result: &ClassificationResult,
        embedding: Option<&Embedding>,
    ) -> Result<()> {
        let now = Utc::now();
        let entry = CacheEntry {
            product_hash: product_hash(&product.name, &product.description),
            product_name: product.name.trim().to_string(),
            product_description: product.description.trim().to_string(),
            suggested_category: result.category.clone(),
            suggested_subcategory: result.subcategory.clone(),
            suggested_parttype: result.part_type.clone(),
            confidence: i32::from(result.confidence),
            validation_reason: Some(result.justification.clone()),
            embedding: embedding
                .filter(|e| !e.is_zero())
                .map(|e| e.values().to_vec()),
            embedding_space: embedding
                .filter(|e| !e.is_zero())
                .map(|e| e.space().to_string()),
            usage_count: 0,
            last_used_at: now,
            created_at: now,
        };

        match self.store.upsert(&entry).await {
            Ok(()) => {
                self.stats.write().await.writes += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.write().await.write_failures += 1;
                Err(e)
            }
        }
    }

    /// Exact-tier lookup for many products at once
    ///
    /// Hashes are deduplicated and fetched in chunks of
    /// `cache.lookup_chunk_size`, one chunk at a time. A failed chunk is
    /// logged and its hashes are treated as misses.
    pub async fn batch_lookup(&self, products: &[ProductInput]) -> HashMap<String, CacheEntry> {
        let row_hashes: Vec<String> = products
            .iter()
            .map(|p| product_hash(&p.name, &p.description))
            .collect();
        let mut seen = HashSet::new();
        let hashes: Vec<&String> = row_hashes.iter().filter(|h| seen.insert(*h)).collect();

        let chunk_size = self.config.lookup_chunk_size.max(1);
        let total_chunks = hashes.len().div_ceil(chunk_size);
        let mut found = HashMap::new();

        for (chunk_idx, chunk) in hashes.chunks(chunk_size).enumerate() {
            let chunk: Vec<String> = chunk.iter().map(|h| (*h).clone()).collect();
            match self.store.get_many(&chunk).await {
                Ok(entries) => {
                    for entry in entries.into_iter().filter(CacheEntry::is_valid) {
                        found.insert(entry.product_hash.clone(), entry);
                    }
                }
                Err(e) => {
                    warn!(
                        "Cache lookup chunk {}/{} ({} hashes) failed, treating as misses: {}",
                        chunk_idx + 1,
                        total_chunks,
                        chunk.len(),
                        e
                    );
                    self.stats.write().await.chunk_failures += 1;
                }
            }
        }

        {
            let row_hits = row_hashes.iter().filter(|h| found.contains_key(*h)).count();
            let mut stats = self.stats.write().await;
            stats.exact_hits += row_hits as u64;
            stats.misses += (row_hashes.len() - row_hits) as u64;
        }

        if !found.is_empty() {
            self.bump_usage(found.keys().cloned().collect()).await;
        }

        info!(
            "Batch cache lookup: {} unique products, {} hits",
            hashes.len(),
            found.len()
        );
        found
    }

    /// Usage tracking never affects the lookup outcome
    async fn bump_usage(&self, hashes: Vec<String>) {
        if let Err(e) = self.store.record_usage(&hashes).await {
            warn!("Failed to record cache usage for {} entries: {}", hashes.len(), e);
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    pub async fn store_stats(&self) -> Result<CacheStoreStats> {
        self.store.stats().await
    }
}
