//! taxomatch: semantic product classification
//!
//! Products (name plus description) are embedded and matched against a
//! three-level taxonomy of categories, subcategories and part types. Results
//! are remembered in a two-tier cache: an exact tier keyed by the normalized
//! product hash and a similarity tier over stored product embeddings.

pub mod api;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod taxonomy;

pub use cache::product_hash;
pub use cache::CacheStore;
pub use cache::ClassificationCache;
pub use cache::InMemoryCacheStore;
pub use classifier::Classifier;
pub use classifier::FallbackPolicy;
pub use config::AppConfig;
pub use database::Database;
pub use embeddings::Embedding;
pub use embeddings::EmbeddingService;
pub use embeddings::EmbeddingSpace;
pub use errors::*;
pub use models::ClassificationResult;
pub use models::MatchProvenance;
pub use models::ProductInput;
pub use pipeline::BatchOutcome;
pub use pipeline::ClassificationPipeline;
pub use taxonomy::InMemoryTaxonomyStore;
pub use taxonomy::TaxonomyIndex;
pub use taxonomy::TaxonomyStore;
