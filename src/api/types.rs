//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::CacheStoreStats;
use crate::models::ClassificationResult;
use crate::models::ProductInput;
use crate::pipeline::QualityStats;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embedding_space: String,
}

/// Single product classification request
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ClassifyRequest {
    pub fn into_product(self) -> ProductInput {
        ProductInput::new(
            self.name.unwrap_or_default(),
            self.description.unwrap_or_default(),
        )
    }
}

/// Single product classification response
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub cached: bool,
}

impl From<ClassificationResult> for ClassifyResponse {
    fn from(result: ClassificationResult) -> Self {
        let cached = result.cached();
        Self { result, cached }
    }
}

/// One row of a batch request
///
/// `id` is opaque to the service and echoed back unchanged, so callers may
/// send strings or numbers.
#[derive(Debug, Deserialize)]
pub struct BatchProduct {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl BatchProduct {
    pub fn to_product(&self) -> ProductInput {
        let product = ProductInput::new(
            self.name.clone().unwrap_or_default(),
            self.description.clone().unwrap_or_default(),
        );
        match &self.id {
            Some(serde_json::Value::String(id)) => product.with_id(id.clone()),
            Some(serde_json::Value::Null) | None => product,
            Some(other) => product.with_id(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchClassifyRequest {
    pub products: Vec<BatchProduct>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResultItem {
    pub id: Option<serde_json::Value>,
    pub category: String,
    pub subcategory: String,
    pub part_type: String,
    pub confidence: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchClassifyResponse {
    pub batch_id: String,
    pub results: Vec<BatchResultItem>,
    pub total_processed: usize,
    pub total_requested: usize,
    pub quality_stats: QualityStats,
    pub cache_hits: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingStats {
    pub provider: String,
    pub space: String,
    pub computed: u64,
}

/// Statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub cache_hit_rate: f64,
    pub cache_store: Option<CacheStoreStats>,
    pub embeddings: EmbeddingStats,
}

/// Taxonomy refresh response
#[derive(Debug, Serialize)]
pub struct TaxonomyResponse {
    pub categories: usize,
    pub subcategories: usize,
    pub part_types: usize,
    pub part_types_with_embeddings: usize,
    pub orphans_skipped: usize,
}
