//! Database initialization handler

use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::database::Database;
use crate::AppConfig;
use crate::Result;

/// Handle database initialization command
pub async fn handle_init_command(config: &AppConfig, force: bool) -> Result<()> {
    if !force {
        print_warning("This will initialize the database schema and create indexes.");
        print_warning("This operation is safe - it uses CREATE IF NOT EXISTS.");
        println!("\nUse --force to proceed.");
        return Ok(());
    }

    print_info("🗄️  Initializing taxomatch database...");
    println!();

    let database = Database::from_config(config).await?;
    let dimension = config.embedding_dimension();

    if let Err(e) = database.init_schema(dimension).await {
        if e.to_string().contains("vector") || e.to_string().contains("extension") {
            print_warning(&format!("Could not enable pgvector extension: {e}"));
            print_warning("Please run on the database server:");
            println!("  psql -d taxomatch -c 'CREATE EXTENSION IF NOT EXISTS vector;'");
            println!();
            println!("Then run: taxomatch init --force");
        }
        return Err(e);
    }

    print_success(&format!("Tables created with {dimension}-dimensional vectors"));
    if let Some(existing) = database.schema_dimension().await? {
        if existing != dimension {
            print_warning(&format!(
                "Existing cache vectors have {existing} dimensions; embeddings.dimension is {dimension}"
            ));
        }
    }

    println!();
    print_success("🎉 Database initialization complete!");
    println!();
    print_info("ℹ️  To load a taxonomy, run:");
    println!("   taxomatch import-taxonomy taxonomy.json --backfill");

    Ok(())
}
