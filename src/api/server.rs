//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::database::Database;
use crate::pipeline::ClassificationPipeline;
use crate::Result;

/// Build the application router with middleware layers
pub fn build_app(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        info!("✅ CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server
///
/// Runs until Ctrl+C or SIGTERM. Batches in flight at shutdown stop starting
/// new products and return what they have.
pub async fn serve_api(config: &AppConfig, host: String, port: u16, enable_cors: bool) -> Result<()> {
    info!("🚀 Starting taxomatch API server...");

    // Initialize services
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;
    let pipeline = Arc::new(ClassificationPipeline::with_database(database, config)?);

    let index = pipeline.refresh_taxonomy().await?;
    info!(
        "🌳 Taxonomy loaded: {} part types ({} with embeddings in {})",
        index.part_type_count(),
        index.usable_part_types(),
        pipeline.embedder().space()
    );

    let state = AppState::new(pipeline);
    let shutdown = state.shutdown.clone();
    let app = build_app(state, enable_cors);

    // Start server
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 API server listening on http://{}", addr);
    info!("📋 RESTful API available at http://{}/api", addr);
    info!("");
    info!("Available endpoints:");
    info!("  GET  /api/health            - Health check");
    info!("  POST /api/classify          - Classify one product");
    info!("  POST /api/classify/batch    - Classify a list of products");
    info!("  POST /api/taxonomy/refresh  - Reload the taxonomy");
    info!("  GET  /api/stats             - Statistics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("👋 API server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel running batches
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("🛑 Shutdown requested, cancelling running batches");
    shutdown.cancel();
}
