//! Connection pool — many provider connections behind one discovery and
//! dispatch surface.
//!
//! Connections are keyed by a caller-assigned alias and kept in
//! registration order. A connection that fails to start is recorded as
//! degraded and simply contributes no tools; it never blocks the others.

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use stepwise_config::ConnectionConfig;
use stepwise_core::connection::ProviderConnection;
use stepwise_core::error::{ConnectionError, ToolError};
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::tool::ToolDescriptor;
use tracing::{debug, info, warn};

use crate::stdio::StdioConnection;

struct PoolEntry {
    alias: String,
    connection: Box<dyn ProviderConnection>,
}

/// Outcome of [`ConnectionPool::start`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartReport {
    /// Aliases that started
    pub started: Vec<String>,
    /// Aliases that failed to start, with the reason
    pub degraded: Vec<(String, String)>,
}

impl StartReport {
    pub fn is_fully_started(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Owns a set of provider connections.
pub struct ConnectionPool {
    name: String,
    entries: Vec<PoolEntry>,
    started: bool,
    stopped: bool,
    degraded: Vec<(String, String)>,
    events: Option<Arc<EventBus>>,
}

impl ConnectionPool {
    /// Create an empty pool. `name` identifies the owner in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            started: false,
            stopped: false,
            degraded: Vec::new(),
            events: None,
        }
    }

    /// A pool of stdio connections built from `[providers.<alias>]` sections.
    pub fn from_config(
        name: impl Into<String>,
        providers: &BTreeMap<String, ConnectionConfig>,
    ) -> Result<Self, ConnectionError> {
        let mut pool = Self::new(name);
        for (alias, config) in providers {
            pool.add(alias.clone(), Box::new(StdioConnection::from_config(alias, config)))?;
        }
        Ok(pool)
    }

    /// Publish pool events on the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a connection. Must precede `start()`.
    pub fn add(
        &mut self,
        alias: impl Into<String>,
        connection: Box<dyn ProviderConnection>,
    ) -> Result<(), ConnectionError> {
        let alias = alias.into();
        if self.started {
            return Err(ConnectionError::AlreadyStarted(self.name.clone()));
        }
        if self.entries.iter().any(|e| e.alias == alias) {
            return Err(ConnectionError::DuplicateAlias(alias));
        }
        self.entries.push(PoolEntry { alias, connection });
        Ok(())
    }

    /// Start every registered connection concurrently.
    pub async fn start(&mut self) -> Result<StartReport, ConnectionError> {
        if self.started {
            return Err(ConnectionError::AlreadyStarted(self.name.clone()));
        }
        self.started = true;

        let outcomes = join_all(self.entries.iter_mut().map(|entry| async move {
            let result = entry.connection.start().await;
            (entry.alias.clone(), result)
        }))
        .await;

        let mut report = StartReport::default();
        for (alias, result) in outcomes {
            match result {
                Ok(()) => report.started.push(alias),
                Err(e) => {
                    warn!(pool = %self.name, alias = %alias, error = %e, "Provider degraded");
                    if let Some(events) = &self.events {
                        events.publish(DomainEvent::ConnectionDegraded {
                            connection: alias.clone(),
                            reason: e.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                    report.degraded.push((alias, e.to_string()));
                }
            }
        }

        info!(
            pool = %self.name,
            started = report.started.len(),
            degraded = report.degraded.len(),
            "Connection pool started"
        );
        self.degraded = report.degraded.clone();
        Ok(report)
    }

    /// Stop every connection, whatever its start outcome. Runs once; later
    /// calls return no errors. Per-connection failures are collected, never
    /// raised.
    pub async fn stop(&mut self) -> Vec<ConnectionError> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        let outcomes = join_all(self.entries.iter_mut().map(|entry| async move {
            let result = entry.connection.stop().await;
            (entry.alias.clone(), result)
        }))
        .await;

        let errors: Vec<ConnectionError> = outcomes
            .into_iter()
            .filter_map(|(alias, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(pool = %self.name, alias = %alias, error = %e, "Provider failed to stop cleanly");
                    Some(e)
                }
            })
            .collect();

        info!(pool = %self.name, errors = errors.len(), "Connection pool stopped");
        errors
    }

    pub fn is_started(&self) -> bool {
        self.started && !self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Aliases in registration order.
    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.alias.as_str()).collect()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.iter().any(|e| e.alias == alias)
    }

    /// Description of the provider registered under `alias`.
    pub fn describe(&self, alias: &str) -> Option<&str> {
        self.entry(alias).map(|e| e.connection.description())
    }

    /// Providers that failed to start.
    pub fn degraded(&self) -> &[(String, String)] {
        &self.degraded
    }

    fn entry(&self, alias: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    async fn live_tools(&self, entry: &PoolEntry) -> Vec<ToolDescriptor> {
        if !entry.connection.state().is_started() {
            return Vec::new();
        }
        match entry.connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(pool = %self.name, alias = %entry.alias, error = %e, "Listing tools failed");
                Vec::new()
            }
        }
    }

    /// Tools of one provider; empty when it is not live.
    pub async fn discover_alias(&self, alias: &str) -> Vec<ToolDescriptor> {
        match self.entry(alias) {
            Some(entry) => self.live_tools(entry).await,
            None => Vec::new(),
        }
    }

    /// Every tool offered by a live connection, in alias order. When two
    /// providers expose the same name the first one wins.
    pub async fn discover(&self) -> Vec<ToolDescriptor> {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();
        for entry in &self.entries {
            for tool in self.live_tools(entry).await {
                if seen.insert(tool.name.clone()) {
                    tools.push(tool);
                } else {
                    warn!(
                        pool = %self.name,
                        alias = %entry.alias,
                        tool = %tool.name,
                        "Duplicate tool name, keeping the first provider's"
                    );
                }
            }
        }
        tools
    }

    /// The "available tools" block: one line per provider, its tools
    /// indented below.
    pub async fn hints(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let tools = self.live_tools(entry).await;
            if tools.is_empty() {
                continue;
            }
            let description = entry.connection.description();
            if description.is_empty() {
                out.push_str(&format!("- {}\n", entry.alias));
            } else {
                out.push_str(&format!("- {}: {}\n", entry.alias, description));
            }
            for tool in tools {
                out.push_str(&format!("  - {}\n", tool.hint()));
            }
        }
        out
    }

    /// Invoke `tool_name` on whichever live connection exposes it.
    pub async fn dispatch(&self, tool_name: &str, parameters: Value) -> Result<String, ToolError> {
        for entry in &self.entries {
            if self.live_tools(entry).await.iter().any(|t| t.name == tool_name) {
                return self.invoke_on(entry, tool_name, parameters).await;
            }
        }
        Err(ToolError::UnknownTool(tool_name.to_string()))
    }

    /// Invoke `tool_name` on the connection registered under `alias`.
    pub async fn dispatch_on(
        &self,
        alias: &str,
        tool_name: &str,
        parameters: Value,
    ) -> Result<String, ToolError> {
        let entry = self
            .entry(alias)
            .ok_or_else(|| ToolError::UnknownCapability(alias.to_string()))?;
        if !self.live_tools(entry).await.iter().any(|t| t.name == tool_name) {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        }
        self.invoke_on(entry, tool_name, parameters).await
    }

    async fn invoke_on(
        &self,
        entry: &PoolEntry,
        tool_name: &str,
        parameters: Value,
    ) -> Result<String, ToolError> {
        debug!(pool = %self.name, alias = %entry.alias, tool = %tool_name, "Dispatching tool call");
        let started = Instant::now();
        let result = entry.connection.invoke(tool_name, parameters).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolDispatched {
                tool_name: tool_name.to_string(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        if let Err(e) = &result {
            warn!(pool = %self.name, tool = %tool_name, error = %e, duration_ms, "Tool call failed");
        }
        result
    }
}
