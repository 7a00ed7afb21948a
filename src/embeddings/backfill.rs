//! Backfill embeddings for taxonomy nodes

use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::generator::EmbeddingService;
use crate::errors::Result;
use crate::models::TaxonomyLevel;
use crate::taxonomy::TaxonomyStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct PendingNode {
    level: TaxonomyLevel,
    id: i64,
    name: String,
}

/// Embed every taxonomy node that has no stored vector yet
///
/// Nodes that already carry an embedding are skipped whatever space it
/// belongs to. A failed chunk or a failed write is logged and counted; the
/// backfill carries on with the next node.
pub async fn backfill_taxonomy_embeddings(
    store: &dyn TaxonomyStore,
    embedding_service: &EmbeddingService,
) -> Result<BackfillStats> {
    info!(
        "Starting taxonomy embeddings backfill (space {})",
        embedding_service.space()
    );

    let mut stats = BackfillStats::default();
    let mut pending = Vec::new();

    for category in store.list_categories().await? {
        stats.total += 1;
        if category.embedding.is_some() {
            stats.skipped += 1;
        } else {
            pending.push(PendingNode {
                level: TaxonomyLevel::Category,
                id: category.id,
                name: category.name,
            });
        }
    }
    for subcategory in store.list_subcategories().await? {
        stats.total += 1;
        if subcategory.embedding.is_some() {
            stats.skipped += 1;
        } else {
            pending.push(PendingNode {
                level: TaxonomyLevel::Subcategory,
                id: subcategory.id,
                name: subcategory.name,
            });
        }
    }
    for part_type in store.list_part_types().await? {
        stats.total += 1;
        if part_type.embedding.is_some() {
            stats.skipped += 1;
        } else {
            pending.push(PendingNode {
                level: TaxonomyLevel::PartType,
                id: part_type.id,
                name: part_type.name,
            });
        }
    }

    info!(
        "Found {} taxonomy nodes, {} need embeddings",
        stats.total,
        pending.len()
    );

    const BATCH_SIZE: usize = 100;
    let space = embedding_service.space().to_string();
    let total_batches = pending.len().div_ceil(BATCH_SIZE);

    for (batch_idx, chunk) in pending.chunks(BATCH_SIZE).enumerate() {
        info!(
            "Processing batch {}/{} ({} nodes)",
            batch_idx + 1,
            total_batches,
            chunk.len()
        );

        let names: Vec<&str> = chunk.iter().map(|n| n.name.as_str()).collect();
        let embeddings = match embedding_service.embed_batch(&names).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                warn!("Failed to embed batch {}: {}", batch_idx + 1, e);
                stats.failed += chunk.len();
                continue;
            }
        };

        for (node, embedding) in chunk.iter().zip(embeddings) {
            match store
                .set_embedding(node.level, node.id, embedding.values(), &space)
                .await
            {
                Ok(()) => stats.updated += 1,
                Err(e) => {
                    warn!(
                        "Failed to store embedding for {} {} '{}': {}",
                        node.level, node.id, node.name, e
                    );
                    stats.failed += 1;
                }
            }
        }
    }

    info!(
        "Backfill complete: {} updated, {} skipped, {} failed",
        stats.updated, stats.skipped, stats.failed
    );

    Ok(stats)
}
