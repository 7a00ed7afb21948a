use clap::Parser;
use taxomatch::cli::handle_backfill_embeddings;
use taxomatch::cli::handle_batch;
use taxomatch::cli::handle_classify;
use taxomatch::cli::handle_config_command;
use taxomatch::cli::handle_import_taxonomy;
use taxomatch::cli::handle_init_command;
use taxomatch::cli::handle_serve_api;
use taxomatch::cli::print_error;
use taxomatch::cli::Cli;
use taxomatch::cli::Commands;
use taxomatch::config::AppConfig;
use taxomatch::Result;
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    // Initialize logging
    if cli.verbose {
        taxomatch::logging::init_logging_with_level("debug")?;
    } else {
        taxomatch::logging::init_logging_with_config(&config.logging)?;
    }
    info!("Configuration loaded successfully");

    // Execute the requested command
    match cli.command {
        Commands::Init { force } => handle_init_command(&config, force).await,
        Commands::ImportTaxonomy { file, backfill } => {
            handle_import_taxonomy(&config, &file, backfill).await
        }
        Commands::BackfillEmbeddings => handle_backfill_embeddings(&config).await,
        Commands::Classify {
            name,
            description,
            json,
        } => handle_classify(&config, name, description, json).await,
        Commands::Batch { file, output } => handle_batch(&config, &file, output.as_deref()).await,
        Commands::Serve { host, port, cors } => handle_serve_api(&config, host, port, cors).await,
        Commands::Config => handle_config_command(&config),
    }
}
