//! `stepwise run` — drive the orchestrator on a single task.

use std::path::PathBuf;
use std::sync::Arc;
use stepwise_agent::{RunStatus, orchestrator_from_config};
use stepwise_config::AppConfig;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_providers::OpenAiCompatProvider;
use tracing::warn;

pub async fn run(
    task: &str,
    config_path: Option<PathBuf>,
    max_rounds: Option<usize>,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(max_rounds) = max_rounds {
        config.agent.max_rounds = max_rounds;
    }
    if let Some(model) = model {
        config.model = model;
    }
    config.validate()?;

    // Fail early with setup instructions
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STEPWISE_API_KEY=sk-...   (generic)");
        eprintln!("    OPENAI_API_KEY=sk-...     (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let events = Arc::new(EventBus::default());

    let mut rx = events.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let DomainEvent::ConnectionDegraded { connection, reason, .. } = event.as_ref() {
                warn!(alias = %connection, %reason, "Provider unavailable for this run");
            }
        }
    });

    let mut orchestrator = orchestrator_from_config(&config, provider, events)?;
    let outcome = orchestrator.run(task).await;
    watcher.abort();
    let result = outcome?;

    match result.status {
        RunStatus::Finished => {
            println!("{}", result.result);
            eprintln!();
            eprintln!("  ({} rounds, {})", result.rounds, result.agent_name);
        }
        RunStatus::Exhausted => {
            eprintln!(
                "No final answer after {} rounds. Raise [agent] max_rounds or use --max-rounds.",
                result.rounds
            );
        }
    }

    Ok(())
}
