//! Build an orchestrator, its providers and its workers from configuration.

use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::error::ConnectionError;
use stepwise_core::event::EventBus;
use stepwise_core::provider::Provider;
use stepwise_tools::ConnectionPool;

use crate::capability::CapabilityRegistry;
use crate::decoder::SelectionMarker;
use crate::orchestrator::Orchestrator;
use crate::worker::WorkerFacade;

/// The registry described by `[providers]` and `[[workers]]`.
pub fn registry_from_config(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    events: Arc<EventBus>,
) -> Result<CapabilityRegistry, ConnectionError> {
    let pool = ConnectionPool::from_config(config.agent.name.clone(), &config.providers)?
        .with_events(events.clone());
    let mut registry = CapabilityRegistry::new(pool);

    for worker_config in &config.workers {
        let worker_pool =
            ConnectionPool::from_config(worker_config.name.clone(), &worker_config.providers)?
                .with_events(events.clone());
        let mut worker = WorkerFacade::new(
            worker_config.name.clone(),
            worker_config.description.clone(),
            worker_pool,
            provider.clone(),
            config.model.clone(),
            events.clone(),
        )
        .with_max_rounds(worker_config.max_rounds)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
        if let Some(prompt) = &worker_config.system_prompt {
            worker = worker.with_system_prompt(prompt.clone());
        }
        registry = registry.with_worker(worker);
    }

    Ok(registry)
}

/// The top-level orchestrator described by the config.
pub fn orchestrator_from_config(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    events: Arc<EventBus>,
) -> Result<Orchestrator, ConnectionError> {
    let registry = registry_from_config(config, provider.clone(), events.clone())?;
    let mut orchestrator = Orchestrator::new(
        config.agent.name.clone(),
        provider,
        config.model.clone(),
        registry,
        SelectionMarker::Worker,
        events,
    )
    .with_max_rounds(config.agent.max_rounds)
    .with_temperature(config.temperature)
    .with_max_tokens(config.max_tokens);

    if let Some(prompt) = &config.agent.system_prompt {
        orchestrator = orchestrator.with_system_prompt(prompt.clone());
    }
    Ok(orchestrator)
}
