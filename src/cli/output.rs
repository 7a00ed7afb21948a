//! CLI output formatting utilities
//!
//! This module provides consistent output formatting for the `taxomatch` CLI

use crate::embeddings::BackfillStats;
use crate::models::ClassificationResult;
use crate::models::MatchProvenance;
use crate::pipeline::BatchOutcome;
use crate::taxonomy::ImportStats;
use crate::AppConfig;

/// Safely truncate a string at character boundary (not byte boundary)
///
/// This prevents panics when truncating strings with multi-byte UTF-8 characters
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

fn describe_provenance(provenance: MatchProvenance) -> String {
    match provenance {
        MatchProvenance::Exact => "exact cache hit".to_string(),
        MatchProvenance::Similar { similarity } => {
            format!("similar cache hit ({similarity}% similar)")
        }
        MatchProvenance::Computed => "computed".to_string(),
    }
}

/// Print a single classification
pub fn print_classification(name: &str, result: &ClassificationResult) {
    println!("🏷️  {name}");
    println!("  Category:    {}", result.category);
    println!("  Subcategory: {}", result.subcategory);
    println!("  Part type:   {}", result.part_type);
    println!("  Confidence:  {}%", result.confidence);
    println!("  Source:      {}", describe_provenance(result.provenance));
    if !result.justification.is_empty() {
        println!("  Why:         {}", result.justification);
    }
}

/// Print batch results as a table followed by the batch statistics
pub fn print_batch_outcome(outcome: &BatchOutcome) {
    println!("📦 Batch {}", outcome.batch_id);
    println!();
    println!(
        "{:<12} {:<24} {:<24} {:<28} {:>5}",
        "ID", "Category", "Subcategory", "Part type", "Conf"
    );
    for item in &outcome.results {
        println!(
            "{:<12} {:<24} {:<24} {:<28} {:>4}%",
            truncate_str(item.id.as_deref().unwrap_or("-"), 9),
            truncate_str(&item.result.category, 21),
            truncate_str(&item.result.subcategory, 21),
            truncate_str(&item.result.part_type, 25),
            item.result.confidence
        );
    }
    println!();

    let stats = &outcome.stats;
    println!("📊 Batch Statistics:");
    println!("  Requested: {}", stats.total_requested);
    println!("  Processed: {}", stats.total_processed);
    println!("  Cache hits: {}", stats.cache_hits);
    println!("  Computed: {}", stats.computed);
    println!("  Failed: {}", stats.failed);
    if stats.cancelled > 0 {
        println!("  Cancelled: {}", stats.cancelled);
    }
    println!(
        "  Quality: {} good / {} weak / {} poor",
        stats.quality_stats.good, stats.quality_stats.weak, stats.quality_stats.poor
    );
}

pub fn print_backfill_stats(stats: &BackfillStats) {
    println!("🧠 Embedding backfill:");
    println!("  Nodes without embeddings: {}", stats.total);
    println!("  Updated: {}", stats.updated);
    println!("  Skipped: {}", stats.skipped);
    println!("  Failed: {}", stats.failed);
}

pub fn print_import_stats(stats: &ImportStats) {
    println!("🌳 Taxonomy import:");
    println!("  Categories: {}", stats.categories);
    println!("  Subcategories: {}", stats.subcategories);
    println!("  Part types: {}", stats.part_types);
}

/// Print configuration
pub fn print_config(config: &AppConfig) {
    println!("📋 taxomatch Configuration:");
    println!();

    println!("🗄️  Database:");
    println!("  URL: {}", mask_database_url(config.database_url()));
    println!("  Max connections: {}", config.max_connections());
    println!("  Min connections: {}", config.min_connections());
    println!("  Connection timeout: {}s", config.connection_timeout());
    println!();

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  File output: {}", config.logging.file_output);
    println!();

    println!("🧠 Embeddings:");
    println!("  Provider: {}", config.embeddings.provider);
    println!("  Model: {}", config.embedding_model());
    println!("  Dimension: {}", config.embedding_dimension());
    if let Some(endpoint) = &config.embeddings.endpoint {
        println!("  Endpoint: {endpoint}");
    }
    println!(
        "  API key: {}",
        if config.embeddings.api_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!();

    println!("🎯 Classifier:");
    println!("  Fallback: {:?}", config.classifier.fallback);
    println!(
        "  Quality bands: good >= {}, weak >= {}",
        config.classifier.good_threshold, config.classifier.weak_threshold
    );
    println!();

    println!("💾 Cache:");
    println!("  Similarity search: {}", config.cache.similarity_search);
    println!("  Similarity threshold: {}", config.cache.similarity_threshold);
    println!("  Lookup chunk size: {}", config.cache.lookup_chunk_size);
    println!();

    println!("⚡ Batch:");
    println!("  Concurrency: {}", config.batch.concurrency);
    println!("  Max products: {}", config.batch.max_products);
    println!("  Write-back timeout: {}ms", config.batch.write_back_timeout_ms);
    println!();

    println!("🌐 Server:");
    println!("  Address: {}:{}", config.server.host, config.server.port);
    println!("  CORS: {}", config.server.enable_cors);
}

/// Mask database URL for logging (hide password)
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            format!(
                "{}://{}@{}:{}",
                parsed.scheme(),
                parsed.username(),
                host,
                parsed.port().unwrap_or(5432)
            )
        } else {
            "***masked***".to_string()
        }
    } else {
        "***invalid***".to_string()
    }
}

/// Print colored output functions
pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    eprintln!("❌ {msg}");
}
