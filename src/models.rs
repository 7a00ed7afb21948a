use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A product as submitted for classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInput {
    /// Caller-side identifier, echoed back in batch results
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Text fed to the embedder: name and description joined by whitespace
    pub fn classification_text(&self) -> String {
        crate::embeddings::classification_text(&self.name, &self.description)
    }

    /// True when both name and description are blank
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.description.trim().is_empty()
    }
}

/// Category row as loaded from taxonomy storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub embedding: Option<Vec<f32>>,
    /// Rendered `EmbeddingSpace` the embedding was produced in
    pub embedding_space: Option<String>,
}

/// Subcategory row; `category_id` references its owning category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryRecord {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_space: Option<String>,
}

/// Part type row; `subcategory_id` references its owning subcategory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTypeRecord {
    pub id: i64,
    pub subcategory_id: i64,
    pub name: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_space: Option<String>,
}

/// Which level of the taxonomy tree a node lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyLevel {
    Category,
    Subcategory,
    PartType,
}

impl TaxonomyLevel {
    pub const fn table(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Subcategory => "subcategories",
            Self::PartType => "part_types",
        }
    }
}

impl std::fmt::Display for TaxonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category => write!(f, "category"),
            Self::Subcategory => write!(f, "subcategory"),
            Self::PartType => write!(f, "part type"),
        }
    }
}

/// How a classification was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "matchType", rename_all = "lowercase")]
pub enum MatchProvenance {
    /// Cache hit on the normalized product hash
    Exact,
    /// Cache hit on a neighbouring product's embedding
    Similar {
        /// Similarity to the cached neighbour, in percent
        similarity: u8,
    },
    /// Freshly computed against the taxonomy
    Computed,
}

impl MatchProvenance {
    pub const fn is_cached(self) -> bool {
        !matches!(self, Self::Computed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Similar { .. } => "similar",
            Self::Computed => "computed",
        }
    }
}

/// A complete three-level assignment for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub category: String,
    pub subcategory: String,
    pub part_type: String,
    /// Rounded mean of the three level similarities, 0..=100
    pub confidence: u8,
    pub justification: String,
    #[serde(flatten)]
    pub provenance: MatchProvenance,
}

impl ClassificationResult {
    pub const fn cached(&self) -> bool {
        self.provenance.is_cached()
    }

    /// Rebuild a result from a cache row
    pub fn from_cache_entry(entry: &CacheEntry, provenance: MatchProvenance) -> Self {
        Self {
            category: entry.suggested_category.clone(),
            subcategory: entry.suggested_subcategory.clone(),
            part_type: entry.suggested_parttype.clone(),
            confidence: entry.confidence.clamp(0, 100) as u8,
            justification: entry.validation_reason.clone().unwrap_or_default(),
            provenance,
        }
    }
}

/// One row of the classification cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub product_hash: String,
    pub product_name: String,
    pub product_description: String,
    pub suggested_category: String,
    pub suggested_subcategory: String,
    pub suggested_parttype: String,
    pub confidence: i32,
    pub validation_reason: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_space: Option<String>,
    pub usage_count: i64,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// A row is usable only when it carries a non-empty category assignment
    pub fn is_valid(&self) -> bool {
        !self.suggested_category.trim().is_empty()
    }
}

/// A cache row matched by embedding similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEntry {
    pub entry: CacheEntry,
    pub similarity: f32,
}

/// Counts reported by a cache store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStoreStats {
    pub total_entries: i64,
    pub entries_with_embeddings: i64,
    pub total_usage: i64,
}
