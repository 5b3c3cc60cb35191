//! `stepwise config` — print the effective or starter configuration.

use std::path::PathBuf;
use stepwise_config::AppConfig;

pub fn show(default: bool, config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = super::load_config(config_path)?;
    // Never echo the key
    if config.api_key.is_some() {
        config.api_key = Some("<redacted>".into());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
