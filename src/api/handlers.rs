//! API request handlers

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::error::ApiError;
use crate::api::types::*;
use crate::pipeline::ClassificationPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClassificationPipeline>,
    /// Cancelled when the server shuts down; batches run on child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Arc<ClassificationPipeline>) -> Self {
        Self {
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_space: state.pipeline.embedder().space().to_string(),
    }))
}

/// Classify a single product
pub async fn classify(
    State(state): State<AppState>,
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let Json(req) = payload?;
    let product = req.into_product();
    info!("POST /api/classify: {}", product.name);

    let result = state.pipeline.classify_one(&product).await?;
    Ok(Json(ClassifyResponse::from(result)))
}

/// Classify a list of products
pub async fn classify_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchClassifyRequest>, JsonRejection>,
) -> Result<Json<BatchClassifyResponse>, ApiError> {
    let Json(req) = payload?;
    info!("POST /api/classify/batch: {} products", req.products.len());

    let products = req.products.iter().map(BatchProduct::to_product).collect();
    let outcome = state
        .pipeline
        .classify_batch(products, state.shutdown.child_token())
        .await?;

    let results = outcome
        .results
        .into_iter()
        .map(|item| BatchResultItem {
            // Echo the caller's id exactly as it was sent
            id: req.products.get(item.index).and_then(|p| p.id.clone()),
            category: item.result.category,
            subcategory: item.result.subcategory,
            part_type: item.result.part_type,
            confidence: item.result.confidence,
        })
        .collect();

    let stats = outcome.stats;
    Ok(Json(BatchClassifyResponse {
        batch_id: outcome.batch_id,
        results,
        total_processed: stats.total_processed,
        total_requested: stats.total_requested,
        quality_stats: stats.quality_stats,
        cache_hits: stats.cache_hits,
        failed: stats.failed,
        cancelled: stats.cancelled,
    }))
}

/// Get cache and embedder statistics
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<StatsResponse>> {
    info!("GET /api/stats");

    let cache = state.pipeline.cache().stats().await;
    let cache_store = match state.pipeline.cache().store_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Failed to read cache store stats: {}", e);
            None
        }
    };

    let embedder = state.pipeline.embedder();
    Json(ApiResponse::success(StatsResponse {
        cache_hit_rate: cache.hit_rate(),
        cache,
        cache_store,
        embeddings: EmbeddingStats {
            provider: embedder.provider().as_str().to_string(),
            space: embedder.space().to_string(),
            computed: embedder.computed_count(),
        },
    }))
}

/// Reload the taxonomy from storage
pub async fn refresh_taxonomy(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TaxonomyResponse>>, ApiError> {
    info!("POST /api/taxonomy/refresh");

    let index = state.pipeline.refresh_taxonomy().await?;
    Ok(Json(ApiResponse::success(TaxonomyResponse {
        categories: index.categories().len(),
        subcategories: index.subcategories().len(),
        part_types: index.part_type_count(),
        part_types_with_embeddings: index.usable_part_types(),
        orphans_skipped: index.orphan_count(),
    })))
}
