pub mod config_cmd;
pub mod run;
pub mod tools;

use std::path::PathBuf;
use stepwise_config::AppConfig;

/// Load from an explicit path, or from the default location.
pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(&path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
