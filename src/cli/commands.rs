//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "taxomatch")]
#[command(about = "Classify products into a category / subcategory / part type taxonomy")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database schema and indexes
    Init {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Import a taxonomy tree from a JSON file
    ImportTaxonomy {
        /// JSON file with `categories[].subcategories[].partTypes[]`
        file: PathBuf,
        /// Compute embeddings for the imported nodes right away
        #[arg(long)]
        backfill: bool,
    },
    /// Compute missing embeddings for taxonomy nodes
    BackfillEmbeddings,
    /// Classify a single product
    Classify {
        /// Product name
        #[arg(short, long)]
        name: String,
        /// Product description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify every product in a JSON file
    Batch {
        /// JSON file with a `products` array, or a bare array of products
        file: PathBuf,
        /// Write results as JSON to this file instead of printing a table
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start the HTTP API server
    Serve {
        /// Host to bind (default: server.host from config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default: server.port from config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable permissive CORS
        #[arg(long)]
        cors: bool,
    },
    /// Show current configuration
    Config,
}
