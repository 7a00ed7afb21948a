//! Classification handlers

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cli::output::print_batch_outcome;
use crate::cli::output::print_classification;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Database;
use crate::models::ProductInput;
use crate::pipeline::ClassificationPipeline;
use crate::AppConfig;
use crate::Result;

/// Product file accepted by `taxomatch batch`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductFile {
    Wrapped { products: Vec<ProductInput> },
    List(Vec<ProductInput>),
}

impl ProductFile {
    fn into_products(self) -> Vec<ProductInput> {
        match self {
            Self::Wrapped { products } | Self::List(products) => products,
        }
    }
}

fn read_products(file: &Path) -> Result<Vec<ProductInput>> {
    let content = std::fs::read_to_string(file)?;
    let parsed: ProductFile = serde_json::from_str(&content)?;
    Ok(parsed.into_products())
}

async fn open_pipeline(config: &AppConfig) -> Result<ClassificationPipeline> {
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;
    ClassificationPipeline::with_database(database, config)
}

pub async fn handle_classify(
    config: &AppConfig,
    name: String,
    description: String,
    json: bool,
) -> Result<()> {
    let pipeline = open_pipeline(config).await?;
    let product = ProductInput::new(name, description);
    let result = pipeline.classify_one(&product).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_classification(&product.name, &result);
    }
    Ok(())
}

pub async fn handle_batch(config: &AppConfig, file: &Path, output: Option<&Path>) -> Result<()> {
    let products = read_products(file)?;
    print_info(&format!(
        "📦 Classifying {} products from {}",
        products.len(),
        file.display()
    ));

    let pipeline = open_pipeline(config).await?;

    // Ctrl+C stops new work; finished rows are still reported
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let outcome = pipeline.classify_batch(products, cancel.clone()).await;
    watcher.abort();
    let outcome = outcome?;

    if cancel.is_cancelled() {
        print_warning("Batch interrupted; remaining products were not classified");
    }

    match output {
        Some(path) => {
            let document = serde_json::json!({
                "batchId": outcome.batch_id,
                "stats": outcome.stats,
                "results": outcome.results,
            });
            std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
            print_success(&format!(
                "Wrote {} results to {}",
                outcome.results.len(),
                path.display()
            ));
        }
        None => print_batch_outcome(&outcome),
    }
    Ok(())
}
