//! Logging configuration for taxomatch

use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{
    self,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;
use crate::Result;

/// Initialize logging with default settings (console and `logs/` file output)
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with configuration
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},taxomatch={}", config.level, config.level))
    });

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = if config.file_output {
        let logs_dir = Path::new(&config.log_dir);
        if !logs_dir.exists() {
            std::fs::create_dir_all(logs_dir)?;
        }

        let file_appender = tracing_appender::rolling::daily(logs_dir, "taxomatch.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The writer flushes on drop; it has to live as long as the process.
        std::mem::forget(guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(non_blocking)
                .with_ansi(false)
                .boxed(),
        )
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::TaxoMatchError::Custom(format!("Failed to install logger: {e}")))?;

    tracing::info!("Logging initialized with level: {}", config.level);
    if config.file_output {
        tracing::info!(
            "Log files will be saved to: {}/taxomatch.log.YYYY-MM-DD",
            config.log_dir
        );
    }

    Ok(())
}

/// Initialize logging with custom log level, console only
pub fn init_logging_with_level(level: &str) -> Result<()> {
    init_logging_with_config(&LoggingConfig {
        level: level.to_string(),
        file_output: false,
        log_dir: String::new(),
    })
}

/// Initialize simple logging for testing
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .map_err(|e| crate::TaxoMatchError::Custom(format!("Failed to install logger: {e}")))?;

    tracing::info!("Simple logging initialized");
    Ok(())
}
