use anyhow::Result;
use llm_inference::{config, pipeline, server};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (before logging setup)
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Environment variable overrides config
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.server.logs.level.clone());

    if let Err(e) = validate_log_level(&log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level)?)
        .json()
        .init();

    info!("Starting LLM inference server with log level: {}", log_level);

    // The listener must not bind unless the model is ready.
    let model_config = config.model.clone();
    let loaded = tokio::task::spawn_blocking(move || pipeline::load(&model_config)).await?;
    let pipeline = match loaded {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to load model '{}': {}", config.model.id, e);
            std::process::exit(1);
        }
    };

    server::run(config.server, Arc::new(pipeline)).await?;

    Ok(())
}
