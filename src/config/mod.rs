mod types;

pub use types::*;

use crate::{Error, Result};
use std::{env, path::Path};
use tracing::debug;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Loads the configuration named by `CONFIG_PATH`, falling back to `config.yaml`.
///
/// Built-in defaults are used only when `CONFIG_PATH` is unset and the default
/// file does not exist. An explicitly named file must be readable.
pub async fn load() -> Result<Config> {
    match env::var("CONFIG_PATH") {
        Ok(config_path) => load_from(config_path).await,
        Err(_) if !Path::new(DEFAULT_CONFIG_PATH).exists() => {
            debug!(
                "No {} found, using built-in configuration defaults",
                DEFAULT_CONFIG_PATH
            );
            Ok(Config::default())
        }
        Err(_) => load_from(DEFAULT_CONFIG_PATH).await,
    }
}

pub async fn load_from(config_path: impl AsRef<Path>) -> Result<Config> {
    let config_path = config_path.as_ref();

    debug!("Loading configuration from: {}", config_path.display());

    let config_str = tokio::fs::read_to_string(config_path).await.map_err(|e| {
        Error::config(format!(
            "Failed to read {}: {}",
            config_path.display(),
            e
        ))
    })?;
    let config: Config = serde_yaml::from_str(&config_str)?;

    Ok(config)
}
