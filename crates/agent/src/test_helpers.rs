//! Shared test helpers for loop tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use stepwise_core::connection::{ConnectionState, ProviderConnection};
use stepwise_core::error::{ConnectionError, ProviderError, ToolError};
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stepwise_core::tool::{Tool, ToolDescriptor};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses
/// provided, unless built with [`SequentialMockProvider::repeating`].
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: Mutex<usize>,
    repeat_last: bool,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
            repeat_last: false,
        }
    }

    /// Create a provider that returns a single text response.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that answers every call with the same response.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        let index = if *count >= responses.len() {
            if !self.repeat_last || responses.is_empty() {
                panic!(
                    "SequentialMockProvider: no more responses (call #{}, have {})",
                    *count,
                    responses.len()
                );
            }
            responses.len() - 1
        } else {
            *count
        };

        let response = responses[index].clone();
        *count += 1;
        Ok(response)
    }
}

/// A provider whose every call fails.
pub struct ErroringProvider;

#[async_trait]
impl Provider for ErroringProvider {
    fn name(&self) -> &str {
        "erroring"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with native tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a native tool call.
pub fn make_tool_call(name: &str, args: Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{}", name),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str { "add" }
    fn description(&self) -> &str { "Add two numbers" }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
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

/// Start/stop counters shared with a [`CountingConnection`].
#[derive(Clone, Default)]
pub struct ConnectionCounters {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

/// Wraps a connection and counts lifecycle calls that reach it.
pub struct CountingConnection<C> {
    inner: C,
    counters: ConnectionCounters,
}

impl<C: ProviderConnection> CountingConnection<C> {
    pub fn wrap(inner: C) -> (Self, ConnectionCounters) {
        let counters = ConnectionCounters::default();
        (
            Self {
                inner,
                counters: counters.clone(),
            },
            counters,
        )
    }
}

#[async_trait]
impl<C: ProviderConnection> ProviderConnection for CountingConnection<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn start(&mut self) -> Result<(), ConnectionError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.inner.start().await
    }

    async fn stop(&mut self) -> Result<(), ConnectionError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop().await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        self.inner.list_tools().await
    }

    async fn invoke(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
        self.inner.invoke(tool_name, arguments).await
    }
}
