//! Shared test doubles for pool and connection tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stepwise_core::connection::{ConnectionState, ProviderConnection};
use stepwise_core::error::{ConnectionError, ToolError};
use stepwise_core::tool::{Tool, ToolDescriptor};

pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str { "add" }
    fn description(&self) -> &str { "Add two numbers" }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
            "required": ["a", "b"]
        })
    }
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let a = arguments["a"].as_i64().ok_or_else(|| ToolError::InvalidArguments("a".into()))?;
        let b = arguments["b"].as_i64().ok_or_else(|| ToolError::InvalidArguments("b".into()))?;
        Ok((a + b).to_string())
    }
}

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str { "echo" }
    fn description(&self) -> &str { "Echoes back the input" }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "text": { "type": "string" } } })
    }
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        Ok(arguments["text"].as_str().unwrap_or("").to_string())
    }
}

/// A connection whose `start()` always fails.
pub struct FailingConnection {
    name: String,
    state: ConnectionState,
    fail_stop: bool,
    stop_calls: Arc<AtomicUsize>,
}

impl FailingConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Uninitialized,
            fail_stop: false,
            stop_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `stop()` fail too.
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn stop_calls(&self) -> Arc<AtomicUsize> {
        self.stop_calls.clone()
    }
}

#[async_trait]
impl ProviderConnection for FailingConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Stopped;
        Err(ConnectionError::StartFailed {
            connection: self.name.clone(),
            reason: "provider crashed on launch".into(),
        })
    }

    async fn stop(&mut self) -> Result<(), ConnectionError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(ConnectionError::Io {
                connection: self.name.clone(),
                reason: "broken pipe".into(),
            });
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        Err(ConnectionError::NotStarted(self.name.clone()))
    }

    async fn invoke(&self, _tool_name: &str, _arguments: Value) -> Result<String, ToolError> {
        Err(ConnectionError::NotStarted(self.name.clone()).into())
    }
}
