//! Taxonomy import and embedding backfill handlers

use std::path::Path;

use crate::cli::output::print_backfill_stats;
use crate::cli::output::print_import_stats;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Database;
use crate::embeddings::backfill_taxonomy_embeddings;
use crate::embeddings::EmbeddingService;
use crate::taxonomy::import_taxonomy;
use crate::taxonomy::TaxonomyTree;
use crate::AppConfig;
use crate::Result;

pub async fn handle_import_taxonomy(config: &AppConfig, file: &Path, backfill: bool) -> Result<()> {
    print_info(&format!("📥 Importing taxonomy from {}", file.display()));

    let tree = TaxonomyTree::from_json_file(file)?;
    let database = Database::from_config(config).await?;
    database.verify_schema_or_error().await?;

    let stats = import_taxonomy(&database, &tree).await?;
    print_import_stats(&stats);
    print_success("Taxonomy imported");

    if backfill {
        run_backfill(config, &database).await?;
    } else {
        print_info("ℹ️  To compute node embeddings, run:");
        println!("   taxomatch backfill-embeddings");
    }
    Ok(())
}

pub async fn handle_backfill_embeddings(config: &AppConfig) -> Result<()> {
    let database = Database::from_config(config).await?;
    database.verify_schema_or_error().await?;
    run_backfill(config, &database).await
}

async fn run_backfill(config: &AppConfig, database: &Database) -> Result<()> {
    let embedding_service = EmbeddingService::new(config)?;
    print_info(&format!(
        "🚀 Computing taxonomy embeddings ({})",
        embedding_service.space()
    ));

    let start = std::time::Instant::now();
    let stats = backfill_taxonomy_embeddings(database, &embedding_service).await?;
    print_backfill_stats(&stats);

    if stats.failed > 0 {
        print_warning(&format!(
            "{} nodes failed; rerun the backfill to retry them",
            stats.failed
        ));
    } else {
        print_success(&format!(
            "Backfill finished in {:.1}s",
            start.elapsed().as_secs_f64()
        ));
    }
    Ok(())
}
