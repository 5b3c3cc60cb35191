//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible model API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used by the orchestrator and every worker
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Top-level orchestrator settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool provider connections owned by the orchestrator, keyed by alias
    #[serde(default)]
    pub providers: BTreeMap<String, ConnectionConfig>,

    /// Workers the orchestrator can delegate to
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_rounds() -> usize {
    20
}
fn default_agent_name() -> String {
    "orchestrator".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .field("workers", &self.workers)
            .finish()
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Step budget: maximum rounds before the run is declared exhausted
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Replaces the built-in role prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_rounds: default_max_rounds(),
            system_prompt: None,
        }
    }
}

/// How to launch one tool provider.
///
/// Either `command` (+ `args`) or the `npx` shorthand must be set:
///
/// ```toml
/// [providers.calc]
/// npx = "@example/calculator-mcp"
/// description = "Arithmetic"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Package to run through `npx -y`; `args` are appended after it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npx: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub description: String,

    /// Per-request timeout for this provider
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ConnectionConfig {
    /// The program and full argument list to spawn.
    pub fn command_line(&self) -> (String, Vec<String>) {
        match &self.npx {
            Some(package) => {
                let mut args = vec!["-y".to_string(), package.clone()];
                args.extend(self.args.iter().cloned());
                ("npx".to_string(), args)
            }
            None => (self.command.clone(), self.args.clone()),
        }
    }
}

/// A delegated sub-agent with its own providers and role prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    #[serde(default)]
    pub providers: BTreeMap<String, ConnectionConfig>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Also checks environment variables:
    /// - `STEPWISE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `STEPWISE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("STEPWISE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("STEPWISE_MODEL") {
            self.model = model;
        }

        if let Ok(url) = std::env::var("STEPWISE_BASE_URL") {
            self.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be greater than 0".into(),
            ));
        }

        validate_providers("providers", &self.providers)?;

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("worker name must not be empty".into()));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
            // Workers and provider aliases share one selection namespace
            if self.providers.contains_key(&worker.name) {
                return Err(ConfigError::ValidationError(format!(
                    "worker '{}' has the same name as a provider",
                    worker.name
                )));
            }
            if worker.max_rounds == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "workers.{}.max_rounds must be greater than 0",
                    worker.name
                )));
            }
            validate_providers(&format!("workers.{}.providers", worker.name), &worker.providers)?;
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `stepwise config --default`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn validate_providers(
    section: &str,
    providers: &BTreeMap<String, ConnectionConfig>,
) -> Result<(), ConfigError> {
    for (alias, conn) in providers {
        let (program, _) = conn.command_line();
        if program.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{section}.{alias}: command must not be empty"
            )));
        }
        if conn.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.{alias}: timeout_secs must be greater than 0"
            )));
        }
    }
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentConfig::default(),
            providers: BTreeMap::new(),
            workers: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for stepwise_core::Error {
    fn from(e: ConfigError) -> Self {
        stepwise_core::Error::Config { message: e.to_string() }
    }
}
