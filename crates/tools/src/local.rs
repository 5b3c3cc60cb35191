//! In-process provider connection.
//!
//! Hosts Rust-native [`Tool`]s behind the same lifecycle and dispatch path
//! as an out-of-process provider, so a pool can mix both.

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::connection::{ConnectionState, ProviderConnection};
use stepwise_core::error::{ConnectionError, ToolError};
use stepwise_core::tool::{Tool, ToolDescriptor};
use tracing::debug;

/// A provider connection backed by in-process tools.
pub struct LocalConnection {
    name: String,
    description: String,
    tools: Vec<Box<dyn Tool>>,
    state: ConnectionState,
}

impl LocalConnection {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
            state: ConnectionState::Uninitialized,
        }
    }

    /// Register a tool. Later registrations with the same name replace
    /// earlier ones.
    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    fn ensure_started(&self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Started => Ok(()),
            ConnectionState::Uninitialized => Err(ConnectionError::NotStarted(self.name.clone())),
            ConnectionState::Stopped => Err(ConnectionError::Stopped(self.name.clone())),
        }
    }
}

#[async_trait]
impl ProviderConnection for LocalConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Uninitialized {
            return Err(ConnectionError::AlreadyStarted(self.name.clone()));
        }
        self.state = ConnectionState::Started;
        debug!(connection = %self.name, tools = self.tools.len(), "Local connection started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Stopped;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        self.ensure_started()?;
        Ok(self.tools.iter().map(|t| t.to_descriptor()).collect())
    }

    async fn invoke(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
        self.ensure_started()?;
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        tool.execute(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AddTool;

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
            let a = arguments["a"].as_f64().ok_or_else(|| ToolError::InvalidArguments("a".into()))?;
            let b = arguments["b"].as_f64().ok_or_else(|| ToolError::InvalidArguments("b".into()))?;
            Ok((a + b).to_string())
        }
    }

    #[tokio::test]
    async fn lifecycle_is_enforced() {
        let mut conn = LocalConnection::new("calc", "Arithmetic").with_tool(Box::new(AddTool));
        assert_eq!(conn.state(), ConnectionState::Uninitialized);
        assert!(matches!(conn.list_tools().await, Err(ConnectionError::NotStarted(_))));

        conn.start().await.unwrap();
        assert!(matches!(conn.start().await, Err(ConnectionError::AlreadyStarted(_))));

        conn.stop().await.unwrap();
        conn.stop().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Stopped);
        assert!(matches!(
            conn.invoke("add", json!({"a": 1, "b": 2})).await,
            Err(ToolError::Connection(ConnectionError::Stopped(_)))
        ));
    }

    #[tokio::test]
    async fn invokes_hosted_tool() {
        let mut conn = LocalConnection::new("calc", "Arithmetic").with_tool(Box::new(AddTool));
        conn.start().await.unwrap();

        let tools = conn.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].hint(), "add: Add two numbers");

        let out = conn.invoke("add", json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, "5");

        let err = conn.invoke("mul", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "mul"));
    }
}
