//! Worker facade — a nested, independently terminating loop exposed to the
//! parent as a single capability.
//!
//! A worker owns its own connection pool and role prompt. The parent hands
//! it a task; the worker drives a fresh loop with the `<TOOL>` marker over
//! its own narrower toolset and returns only the final answer.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use stepwise_core::error::{ConnectionError, ProviderError, ToolError};
use stepwise_core::event::EventBus;
use stepwise_core::provider::Provider;
use stepwise_core::tool::{ToolCallRequest, ToolDescriptor};
use stepwise_tools::{ConnectionPool, StartReport};
use tracing::info;

use crate::capability::{Capability, CapabilityRegistry};
use crate::decoder::SelectionMarker;
use crate::orchestrator::{Orchestrator, RunStatus};

/// What a worker hands back to its parent.
///
/// `final_text` is empty when `status` is [`RunStatus::Exhausted`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub worker_name: String,
    pub final_text: String,
    pub round_count: usize,
    pub status: RunStatus,
}

/// A sub-agent: a pool, a role prompt and a bounded loop.
pub struct WorkerFacade {
    name: String,
    description: String,
    orchestrator: Orchestrator,
}

impl WorkerFacade {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        pool: ConnectionPool,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        events: Arc<EventBus>,
    ) -> Self {
        let name = name.into();
        let orchestrator = Orchestrator::new(
            name.clone(),
            provider,
            model,
            CapabilityRegistry::new(pool),
            SelectionMarker::Tool,
            events,
        );
        Self {
            name,
            description: description.into(),
            orchestrator,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.orchestrator = self.orchestrator.with_system_prompt(prompt);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.orchestrator = self.orchestrator.with_max_rounds(max_rounds);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.orchestrator = self.orchestrator.with_temperature(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.orchestrator = self.orchestrator.with_max_tokens(max_tokens);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The worker's own pool.
    pub fn pool(&self) -> &ConnectionPool {
        self.orchestrator.registry().pool()
    }

    pub async fn start(&mut self) -> Result<StartReport, ConnectionError> {
        self.orchestrator.start().await
    }

    /// Run one delegated task to completion.
    pub async fn run(&self, task: &str) -> Result<WorkerResult, ProviderError> {
        info!(worker = %self.name, "Delegated task received");
        let run = self.orchestrator.drive(task).await?;
        Ok(WorkerResult {
            worker_name: self.name.clone(),
            final_text: run.result,
            round_count: run.rounds,
            status: run.status,
        })
    }

    /// Release the worker's pool, independent of the parent's.
    pub async fn cleanup(&mut self) -> Vec<ConnectionError> {
        self.orchestrator.cleanup().await
    }

    fn task_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            self.name.clone(),
            self.description.clone(),
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "The sub-task or question for this worker"
                    }
                },
                "required": ["task"]
            }),
        )
    }
}

#[async_trait]
impl Capability for WorkerFacade {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![self.task_descriptor()]
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let task = call
            .parameters
            .get("task")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments(format!("{} requires a 'task' string", self.name)))?;

        let result = self.run(task).await.map_err(ToolError::Model)?;

        match result.status {
            RunStatus::Finished => Ok(result.final_text),
            RunStatus::Exhausted => Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: format!("no final answer within {} rounds", result.round_count),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::{Map, json};
    use std::sync::atomic::Ordering;
    use stepwise_tools::LocalConnection;

    fn calc_worker(provider: Arc<dyn Provider>) -> (WorkerFacade, ConnectionCounters) {
        let (conn, counters) = CountingConnection::wrap(
            LocalConnection::new("calc", "Arithmetic").with_tool(Box::new(AddTool)),
        );
        let mut pool = ConnectionPool::new("math");
        pool.add("calc", Box::new(conn)).unwrap();
        let worker = WorkerFacade::new(
            "math",
            "Does arithmetic",
            pool,
            provider,
            "mock-model",
            Arc::new(EventBus::default()),
        );
        (worker, counters)
    }

    fn task_call(task: &str) -> ToolCallRequest {
        let mut params = Map::new();
        params.insert("task".into(), json!(task));
        ToolCallRequest::new("math", params)
    }

    #[tokio::test]
    async fn worker_runs_nested_loop_with_tool_marker() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("<TOOL>add</TOOL>"),
            make_text_response(r#"{"name": "add", "arguments": {"a": 20, "b": 22}}"#),
            make_text_response("<FINAL_ANSWER>42</FINAL_ANSWER>"),
        ]));
        let (mut worker, counters) = calc_worker(provider.clone());
        worker.start().await.unwrap();

        let result = worker.run("add 20 and 22").await.unwrap();
        assert_eq!(
            result,
            WorkerResult {
                worker_name: "math".into(),
                final_text: "42".into(),
                round_count: 2,
                status: RunStatus::Finished,
            }
        );

        // The worker prompt teaches <TOOL>, not <WORKER>
        let system = &provider.requests()[0].messages[0].content;
        assert!(system.contains("<TOOL>NAME"));
        assert!(!system.contains("<WORKER>"));

        worker.cleanup().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invoke_returns_only_the_final_answer() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Let me think out loud for a while."),
            make_text_response("<FINAL_ANSWER> 42 </FINAL_ANSWER>"),
        ]));
        let (mut worker, _) = calc_worker(provider);
        worker.start().await.unwrap();

        let out = worker.invoke(&task_call("meaning of life")).await.unwrap();
        assert_eq!(out, "42");

        let descriptors = worker.descriptors().await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].schema["required"][0], "task");
        worker.cleanup().await;
    }

    #[tokio::test]
    async fn exhausted_worker_is_an_execution_failure() {
        let provider = Arc::new(SequentialMockProvider::repeating(make_text_response("hmm")));
        let (worker, _) = calc_worker(provider);
        let worker = worker.with_max_rounds(2);

        let err = worker.invoke(&task_call("impossible")).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { reason, .. } if reason.contains("2 rounds")));
    }

    #[tokio::test]
    async fn exhausted_run_has_empty_final_text() {
        let provider = Arc::new(SequentialMockProvider::repeating(make_text_response("hmm")));
        let (worker, _) = calc_worker(provider);
        let worker = worker.with_max_rounds(3);

        let result = worker.run("impossible").await.unwrap();
        assert_eq!(result.status, RunStatus::Exhausted);
        assert_eq!(result.round_count, 3);
        assert!(result.final_text.is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_not_an_execution_failure() {
        let (worker, _) = calc_worker(Arc::new(ErroringProvider));
        let err = worker.invoke(&task_call("add 2 and 3")).await.unwrap_err();
        assert!(matches!(err, ToolError::Model(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn missing_task_is_invalid() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let (worker, _) = calc_worker(provider);
        let err = worker
            .invoke(&ToolCallRequest::new("math", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
