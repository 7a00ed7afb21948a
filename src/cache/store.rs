//! Cache storage contract and the in-memory implementation

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::embeddings::Embedding;
use crate::errors::Result;
use crate::models::CacheEntry;
use crate::models::CacheStoreStats;
use crate::models::SimilarEntry;

/// Persistent side of the classification cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, product_hash: &str) -> Result<Option<CacheEntry>>;

    /// Fetch all rows for `product_hashes` in one request; unknown hashes are absent
    async fn get_many(&self, product_hashes: &[String]) -> Result<Vec<CacheEntry>>;

    /// Insert, or replace the classification of an existing hash while
    /// keeping its usage history
    async fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Rows from the same embedding space with similarity >= `threshold`,
    /// most similar first
    async fn find_similar(
        &self,
        embedding: &Embedding,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarEntry>>;

    /// Increment usage and touch `last_used_at` for each hash
    async fn record_usage(&self, product_hashes: &[String]) -> Result<()>;

    async fn stats(&self) -> Result<CacheStoreStats>;
}

/// Cache rows kept in a concurrent map
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, product_hash: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(product_hash).map(|e| e.value().clone()))
    }

    async fn get_many(&self, product_hashes: &[String]) -> Result<Vec<CacheEntry>> {
        Ok(product_hashes
            .iter()
            .filter_map(|hash| self.entries.get(hash).map(|e| e.value().clone()))
            .collect())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .entry(entry.product_hash.clone())
            .and_modify(|existing| {
                let usage_count = existing.usage_count;
                let created_at = existing.created_at;
                *existing = entry.clone();
                existing.usage_count = usage_count;
                existing.created_at = created_at;
                existing.last_used_at = Utc::now();
            })
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarEntry>> {
        let space = embedding.space();
        let mut matches: Vec<SimilarEntry> = self
            .entries
            .iter()
            .filter(|e| e.is_valid())
            .filter(|e| e.embedding_space.as_deref().is_some_and(|tag| space.matches_tag(tag)))
            .filter_map(|e| {
                let stored = e.embedding.as_deref()?;
                let similarity = embedding.similarity_to_raw(stored).ok()?;
                (similarity >= threshold).then(|| SimilarEntry {
                    entry: e.value().clone(),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.entry.product_hash.cmp(&b.entry.product_hash))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn record_usage(&self, product_hashes: &[String]) -> Result<()> {
        let now = Utc::now();
        for hash in product_hashes {
            if let Some(mut entry) = self.entries.get_mut(hash) {
                entry.usage_count += 1;
                entry.last_used_at = now;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStoreStats> {
        let mut stats = CacheStoreStats::default();
        for entry in &self.entries {
            stats.total_entries += 1;
            if entry.embedding.is_some() {
                stats.entries_with_embeddings += 1;
            }
            stats.total_usage += entry.usage_count;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingSpace;

    fn entry(hash: &str, category: &str, embedding: Option<Vec<f32>>) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            product_hash: hash.to_string(),
            product_name: "name".to_string(),
            product_description: String::new(),
            suggested_category: category.to_string(),
            suggested_subcategory: "Pads".to_string(),
            suggested_parttype: "Brake Pads".to_string(),
            confidence: 40,
            validation_reason: None,
            embedding,
            embedding_space: Some("test/2".to_string()),
            usage_count: 0,
            last_used_at: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_usage_history() {
        let store = InMemoryCacheStore::new();
        store.upsert(&entry("h1", "Brakes", None)).await.unwrap();
        store.record_usage(&["h1".to_string()]).await.unwrap();
        store.upsert(&entry("h1", "Filters", None)).await.unwrap();

        let row = store.get("h1").await.unwrap().unwrap();
        assert_eq!(row.suggested_category, "Filters");
        assert_eq!(row.usage_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_similar_filters_space_and_threshold() {
        let store = InMemoryCacheStore::new();
        store
            .upsert(&entry("close", "Brakes", Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        store
            .upsert(&entry("far", "Brakes", Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        let mut foreign = entry("foreign", "Brakes", Some(vec![1.0, 0.0]));
        foreign.embedding_space = Some("other/2".to_string());
        store.upsert(&foreign).await.unwrap();
        store
            .upsert(&entry("invalid", "", Some(vec![1.0, 0.0])))
            .await
            .unwrap();

        let query = Embedding::new(EmbeddingSpace::new("test", 2), vec![1.0, 0.0]).unwrap();
        let found = store.find_similar(&query, 0.85, 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entry.product_hash, "close");
    }

    #[tokio::test]
    async fn test_get_many_skips_unknown() {
        let store = InMemoryCacheStore::new();
        store.upsert(&entry("a", "Brakes", None)).await.unwrap();
        let rows = store
            .get_many(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.entries_with_embeddings, 0);
    }
}
