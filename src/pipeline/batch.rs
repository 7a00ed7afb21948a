//! Batch classification
//!
//! One exact-tier cache lookup covers the whole batch. Products that miss are
//! grouped by hash, so duplicates inside a batch are embedded and classified
//! once, and the groups run with bounded concurrency. Fresh results are
//! written back to the cache in the background; the batch waits for those
//! writes only up to `batch.write_back_timeout_ms`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::stream::StreamExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::ClassificationPipeline;
use crate::cache::product_hash;
use crate::classifier::QualityBand;
use crate::embeddings::Embedding;
use crate::errors::Result;
use crate::errors::TaxoMatchError;
use crate::models::ClassificationResult;
use crate::models::MatchProvenance;
use crate::models::ProductInput;
use crate::taxonomy::TaxonomyIndex;

/// Classification of one input row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Position of the product in the request
    pub index: usize,
    pub id: Option<String>,
    pub product_hash: String,
    pub result: ClassificationResult,
    pub quality: QualityBand,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityStats {
    pub good: usize,
    pub weak: usize,
    pub poor: usize,
}

impl QualityStats {
    pub fn record(&mut self, band: QualityBand) {
        match band {
            QualityBand::Good => self.good += 1,
            QualityBand::Weak => self.weak += 1,
            QualityBand::Poor => self.poor += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_requested: usize,
    pub total_processed: usize,
    /// Products skipped because of invalid input or a classification error
    pub failed: usize,
    /// Products never started because the batch was cancelled
    pub cancelled: usize,
    pub cache_hits: usize,
    pub computed: usize,
    pub quality_stats: QualityStats,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Identifier used to correlate the batch in logs
    pub batch_id: String,
    /// Successful classifications in request order
    pub results: Vec<BatchItemResult>,
    pub stats: BatchStats,
}

/// Products in one batch that share a hash
struct MissGroup {
    hash: String,
    members: Vec<usize>,
}

enum GroupOutcome {
    Cancelled,
    Classified(ClassificationResult, Embedding),
    Failed(TaxoMatchError),
}

impl ClassificationPipeline {
    /// Classify a list of products
    ///
    /// Individual products that fail are skipped and counted in
    /// `stats.failed`. Cancelling `cancel` stops new work; products already
    /// being classified finish, the rest are counted in `stats.cancelled`.
    ///
    /// # Errors
    /// - `InvalidInput` when the batch exceeds `batch.max_products`
    /// - `EmptyTaxonomy` before any product is processed
    /// - Taxonomy store failures while loading the index
    pub async fn classify_batch(
        &self,
        products: Vec<ProductInput>,
        cancel: CancellationToken,
    ) -> Result<BatchOutcome> {
        if products.len() > self.batch_config.max_products {
            return Err(TaxoMatchError::InvalidInput(format!(
                "batch of {} products exceeds the limit of {}",
                products.len(),
                self.batch_config.max_products
            )));
        }

        let batch_id = Uuid::new_v4().to_string();
        info!("📦 Classifying batch {} of {} products", batch_id, products.len());
        let start = std::time::Instant::now();

        // Each batch runs against a fresh snapshot of the taxonomy
        let index = Arc::new(self.load_index().await?);
        if index.is_empty() {
            return Err(TaxoMatchError::EmptyTaxonomy);
        }

        let mut stats = BatchStats {
            total_requested: products.len(),
            ..BatchStats::default()
        };
        let mut slots: Vec<Option<BatchItemResult>> = vec![None; products.len()];

        let mut hashes: Vec<Option<String>> = Vec::with_capacity(products.len());
        for (i, product) in products.iter().enumerate() {
            if product.is_blank() {
                warn!("Skipping product #{} ({:?}): empty name and description", i, product.id);
                stats.failed += 1;
                hashes.push(None);
            } else {
                hashes.push(Some(product_hash(&product.name, &product.description)));
            }
        }

        let valid: Vec<ProductInput> = products
            .iter()
            .filter(|p| !p.is_blank())
            .cloned()
            .collect();
        let hits = self.cache.batch_lookup(&valid).await;

        let mut groups: Vec<MissGroup> = Vec::new();
        let mut group_pos: HashMap<String, usize> = HashMap::new();
        for (i, hash) in hashes.into_iter().enumerate() {
            let Some(hash) = hash else {
                continue;
            };
            if let Some(entry) = hits.get(&hash) {
                let result = ClassificationResult::from_cache_entry(entry, MatchProvenance::Exact);
                slots[i] = Some(self.item(i, &products[i], hash, result));
                stats.cache_hits += 1;
                continue;
            }
            match group_pos.get(&hash) {
                Some(&pos) => groups[pos].members.push(i),
                None => {
                    group_pos.insert(hash.clone(), groups.len());
                    groups.push(MissGroup {
                        hash,
                        members: vec![i],
                    });
                }
            }
        }

        debug!(
            "{} cache hits, {} unique products to classify",
            stats.cache_hits,
            groups.len()
        );

        let mut write_backs = JoinSet::new();
        let mut outcomes = stream::iter(groups)
            .map(|group| {
                let index = Arc::clone(&index);
                let product = &products[group.members[0]];
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (group, GroupOutcome::Cancelled);
                    }
                    let outcome = match self.classify_miss(product, &index).await {
                        Ok((result, embedding)) => GroupOutcome::Classified(result, embedding),
                        Err(e) => GroupOutcome::Failed(e),
                    };
                    (group, outcome)
                }
            })
            .buffer_unordered(self.batch_config.concurrency.max(1));

        while let Some((group, outcome)) = outcomes.next().await {
            let representative = &products[group.members[0]];
            match outcome {
                GroupOutcome::Cancelled => stats.cancelled += group.members.len(),
                GroupOutcome::Failed(e) => {
                    warn!(
                        "Skipping product '{}' ({} rows): {}",
                        representative.name,
                        group.members.len(),
                        e
                    );
                    stats.failed += group.members.len();
                }
                GroupOutcome::Classified(result, embedding) => {
                    let cache = Arc::clone(&self.cache);
                    let product = representative.clone();
                    let stored = result.clone();
                    write_backs.spawn(async move {
                        if let Err(e) = cache
                            .store_with_embedding(&product, &stored, Some(&embedding))
                            .await
                        {
                            warn!("Failed to cache classification for '{}': {}", product.name, e);
                        }
                    });

                    for &i in &group.members {
                        slots[i] = Some(self.item(i, &products[i], group.hash.clone(), result.clone()));
                        stats.computed += 1;
                    }
                }
            }
        }
        drop(outcomes);

        self.drain_write_backs(&mut write_backs).await;

        let results: Vec<BatchItemResult> = slots.into_iter().flatten().collect();
        for item in &results {
            stats.quality_stats.record(item.quality);
        }
        stats.total_processed = results.len();

        info!(
            "✅ Batch {} complete in {:.2}s: {}/{} processed ({} cached, {} computed, {} failed, {} cancelled)",
            batch_id,
            start.elapsed().as_secs_f64(),
            stats.total_processed,
            stats.total_requested,
            stats.cache_hits,
            stats.computed,
            stats.failed,
            stats.cancelled
        );

        Ok(BatchOutcome {
            batch_id,
            results,
            stats,
        })
    }

    async fn classify_miss(
        &self,
        product: &ProductInput,
        index: &TaxonomyIndex,
    ) -> Result<(ClassificationResult, Embedding)> {
        let embedding = self.embedder.embed(&product.classification_text()).await?;
        let result = self.compute(&embedding, index)?;
        Ok((result, embedding))
    }

    fn item(
        &self,
        index: usize,
        product: &ProductInput,
        product_hash: String,
        result: ClassificationResult,
    ) -> BatchItemResult {
        BatchItemResult {
            index,
            id: product.id.clone(),
            product_hash,
            quality: self.classifier.quality_band(result.confidence),
            result,
        }
    }

    /// Wait for pending cache writes, giving up after the configured timeout
    async fn drain_write_backs(&self, write_backs: &mut JoinSet<()>) {
        if write_backs.is_empty() {
            return;
        }

        let timeout = Duration::from_millis(self.batch_config.write_back_timeout_ms);
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = write_backs.join_next().await {
                if let Err(e) = joined {
                    warn!("Cache write-back task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "⚠️  {} cache writes still pending after {:?}, leaving them in the background",
                write_backs.len(),
                timeout
            );
            write_backs.detach_all();
        }
    }
}
