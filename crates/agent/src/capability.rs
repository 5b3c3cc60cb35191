//! Capabilities: one interface over "call a tool" and "delegate to a
//! worker".
//!
//! The loop resolves a selected name to a [`Capability`], asks it for the
//! schemas to offer at elicitation, and invokes it with the decoded call.
//! It never needs to know whether a provider or a nested worker sits
//! behind the name.

use async_trait::async_trait;
use stepwise_core::error::{ConnectionError, ToolError};
use stepwise_core::tool::{ToolCallRequest, ToolDescriptor};
use stepwise_tools::{ConnectionPool, StartReport};
use tracing::debug;

use crate::worker::WorkerFacade;

/// Something the loop can select by name and invoke.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The selection name.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Schemas offered to the model when this capability is selected.
    async fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Run one decoded call and return its text result.
    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError>;
}

#[async_trait]
impl<C: Capability + ?Sized> Capability for &C {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        (**self).descriptors().await
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        (**self).invoke(call).await
    }
}

/// What part of a pool a [`PoolCapability`] exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolScope {
    /// Every tool of the provider registered under this alias
    Provider(String),
    /// A single tool, wherever it lives
    Tool(String),
}

/// A view of a connection pool as a capability.
pub struct PoolCapability<'a> {
    pool: &'a ConnectionPool,
    scope: PoolScope,
}

impl<'a> PoolCapability<'a> {
    pub fn new(pool: &'a ConnectionPool, scope: PoolScope) -> Self {
        Self { pool, scope }
    }

    pub fn scope(&self) -> &PoolScope {
        &self.scope
    }
}

#[async_trait]
impl Capability for PoolCapability<'_> {
    fn name(&self) -> &str {
        match &self.scope {
            PoolScope::Provider(alias) => alias,
            PoolScope::Tool(name) => name,
        }
    }

    fn description(&self) -> &str {
        match &self.scope {
            PoolScope::Provider(alias) => self.pool.describe(alias).unwrap_or(""),
            PoolScope::Tool(_) => "",
        }
    }

    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        match &self.scope {
            PoolScope::Provider(alias) => self.pool.discover_alias(alias).await,
            PoolScope::Tool(name) => self
                .pool
                .discover()
                .await
                .into_iter()
                .filter(|t| &t.name == name)
                .collect(),
        }
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        match &self.scope {
            PoolScope::Provider(alias) => {
                self.pool.dispatch_on(alias, &call.name, call.arguments()).await
            }
            PoolScope::Tool(name) if name == &call.name => {
                self.pool.dispatch(&call.name, call.arguments()).await
            }
            PoolScope::Tool(_) => Err(ToolError::UnknownTool(call.name.clone())),
        }
    }
}

/// Everything one loop can select: its own providers and its workers.
pub struct CapabilityRegistry {
    pool: ConnectionPool,
    workers: Vec<WorkerFacade>,
}

impl CapabilityRegistry {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            workers: Vec::new(),
        }
    }

    pub fn with_worker(mut self, worker: WorkerFacade) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn workers(&self) -> &[WorkerFacade] {
        &self.workers
    }

    /// Resolve a selection: worker name first, then provider alias, then
    /// tool name.
    pub async fn resolve(&self, name: &str) -> Option<Box<dyn Capability + '_>> {
        if let Some(worker) = self.workers.iter().find(|w| w.name() == name) {
            debug!(selection = %name, "Resolved to worker");
            return Some(Box::new(worker));
        }

        if self.pool.contains_alias(name) {
            debug!(selection = %name, "Resolved to provider");
            return Some(Box::new(PoolCapability::new(
                &self.pool,
                PoolScope::Provider(name.to_string()),
            )));
        }

        if self.pool.discover().await.iter().any(|t| t.name == name) {
            debug!(selection = %name, "Resolved to tool");
            return Some(Box::new(PoolCapability::new(
                &self.pool,
                PoolScope::Tool(name.to_string()),
            )));
        }

        None
    }

    /// The "available workers/tools" block of the system prompt.
    pub async fn hints(&self) -> String {
        let mut out = String::new();
        for worker in &self.workers {
            if worker.description().is_empty() {
                out.push_str(&format!("- {}\n", worker.name()));
            } else {
                out.push_str(&format!("- {}: {}\n", worker.name(), worker.description()));
            }
        }
        out.push_str(&self.pool.hints().await);
        out
    }

    /// Start the pool and every worker. Worker degradations are reported
    /// as `worker/alias`.
    pub async fn start(&mut self) -> Result<StartReport, ConnectionError> {
        let mut report = self.pool.start().await?;
        for worker in &mut self.workers {
            // Workers own orchestrators, so the nested future must be boxed
            let worker_report = Box::pin(worker.start()).await?;
            let prefix = worker.name().to_string();
            report.started.extend(
                worker_report
                    .started
                    .into_iter()
                    .map(|alias| format!("{prefix}/{alias}")),
            );
            report.degraded.extend(
                worker_report
                    .degraded
                    .into_iter()
                    .map(|(alias, reason)| (format!("{prefix}/{alias}"), reason)),
            );
        }
        Ok(report)
    }

    /// Stop the pool and every worker's pool. Never raises.
    pub async fn cleanup(&mut self) -> Vec<ConnectionError> {
        let mut errors = self.pool.stop().await;
        for worker in &mut self.workers {
            errors.extend(Box::pin(worker.cleanup()).await);
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{AddTool, EchoTool};
    use serde_json::{Map, json};
    use stepwise_tools::LocalConnection;

    async fn started_registry() -> CapabilityRegistry {
        let mut pool = ConnectionPool::new("test");
        pool.add(
            "calc",
            Box::new(LocalConnection::new("calc", "Arithmetic").with_tool(Box::new(AddTool))),
        )
        .unwrap();
        pool.add(
            "misc",
            Box::new(LocalConnection::new("misc", "").with_tool(Box::new(EchoTool))),
        )
        .unwrap();
        let mut registry = CapabilityRegistry::new(pool);
        registry.start().await.unwrap();
        registry
    }

    fn call(name: &str, params: serde_json::Value) -> ToolCallRequest {
        let map: Map<String, serde_json::Value> = params.as_object().cloned().unwrap_or_default();
        ToolCallRequest::new(name, map)
    }

    #[tokio::test]
    async fn provider_alias_resolves_to_its_tools() {
        let registry = started_registry().await;
        let cap = registry.resolve("calc").await.unwrap();
        assert_eq!(cap.name(), "calc");
        assert_eq!(cap.description(), "Arithmetic");

        let descriptors = cap.descriptors().await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "add");

        let out = cap.invoke(&call("add", json!({"a": 2, "b": 3}))).await.unwrap();
        assert_eq!(out, "5");

        // echo lives on another provider
        let err = cap.invoke(&call("echo", json!({"text": "hi"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn tool_name_resolves_to_single_tool() {
        let registry = started_registry().await;
        let cap = registry.resolve("echo").await.unwrap();
        assert_eq!(cap.descriptors().await.len(), 1);
        assert_eq!(cap.invoke(&call("echo", json!({"text": "hi"}))).await.unwrap(), "hi");
        assert!(cap.invoke(&call("add", json!({"a": 1, "b": 1}))).await.is_err());
    }

    #[tokio::test]
    async fn unknown_name_is_unresolved() {
        let registry = started_registry().await;
        assert!(registry.resolve("unknown_name").await.is_none());
    }

    #[tokio::test]
    async fn hints_list_providers_and_tools() {
        let mut registry = started_registry().await;
        let hints = registry.hints().await;
        assert!(hints.contains("- calc: Arithmetic\n  - add: Add two numbers\n"));
        assert!(hints.contains("- misc\n  - echo: Echoes back the input\n"));
        assert!(registry.cleanup().await.is_empty());
        assert!(registry.pool().is_stopped());
    }
}
