//! The orchestration loop.
//!
//! Each round walks an explicit state machine:
//!
//! ```text
//! BuildingPrompt ─▶ AwaitingModel ─▶ InspectingOutput ─┬─▶ Finished
//!       ▲                                              ├─▶ Dispatching ─┐
//!       │                                              └─▶ Continuing ◀─┘
//!       └──────────────────────────────────────────────────────┘
//! BuildingPrompt ─▶ Exhausted   (once the step budget is spent)
//! ```
//!
//! The raw model answer is appended to history before it is inspected, so
//! a failed interpretation never loses context. Everything that goes
//! wrong below the model call (bad selection, malformed call, tool
//! failure) is recorded as an assistant notice and the loop carries on.
//! A failed model call, including one inside a nested worker, ends the run.

use chrono::Utc;
use std::sync::Arc;
use stepwise_core::error::{ConnectionError, Error, ProviderError, ToolError};
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::message::{Conversation, Message};
use stepwise_core::provider::{Provider, ProviderRequest};
use stepwise_core::tool::ToolDescriptor;
use stepwise_tools::StartReport;
use tracing::{debug, info, warn};

use crate::capability::CapabilityRegistry;
use crate::decoder::{FINAL_ANSWER, SelectionMarker, decode_tool_calls};
use crate::prompts;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model emitted a final answer
    Finished,
    /// The step budget ran out first
    Exhausted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Finished => f.write_str("finished"),
            RunStatus::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// The result of one run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub agent_name: String,
    pub status: RunStatus,
    /// The final answer; empty when exhausted
    pub result: String,
    /// Rounds performed, including the one that produced the answer
    pub rounds: usize,
    /// The complete conversation of the run
    pub history: Conversation,
}

#[derive(Debug)]
enum LoopState {
    BuildingPrompt,
    AwaitingModel,
    InspectingOutput(Message),
    Dispatching(String),
    Continuing,
    Finished(String),
    Exhausted,
}

/// A bounded loop that turns model steps into dispatches until the model
/// gives a final answer.
pub struct Orchestrator {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    registry: CapabilityRegistry,
    marker: SelectionMarker,
    role_prompt: String,
    max_rounds: usize,
    temperature: f32,
    max_tokens: Option<u32>,
    events: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        registry: CapabilityRegistry,
        marker: SelectionMarker,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            registry,
            marker,
            role_prompt: prompts::default_role(marker).to_string(),
            max_rounds: 20,
            temperature: 0.7,
            max_tokens: None,
            events,
        }
    }

    /// Set the step budget.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Replace the role part of the system prompt.
    pub fn with_system_prompt(mut self, role_prompt: impl Into<String>) -> Self {
        self.role_prompt = role_prompt.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Start every owned connection and worker.
    pub async fn start(&mut self) -> Result<StartReport, ConnectionError> {
        let report = self.registry.start().await?;
        info!(
            agent = %self.name,
            started = report.started.len(),
            degraded = report.degraded.len(),
            "Capabilities started"
        );
        Ok(report)
    }

    /// Stop every owned connection and worker. Safe to call repeatedly.
    pub async fn cleanup(&mut self) -> Vec<ConnectionError> {
        let errors = self.registry.cleanup().await;
        if !errors.is_empty() {
            warn!(agent = %self.name, errors = errors.len(), "Cleanup finished with errors");
        }
        errors
    }

    /// Start, drive the loop, and clean up on every exit path.
    pub async fn run(&mut self, task: &str) -> Result<RunResult, Error> {
        if let Err(e) = self.start().await {
            self.cleanup().await;
            return Err(e.into());
        }
        let outcome = self.drive(task).await;
        self.cleanup().await;
        outcome.map_err(Error::from)
    }

    /// Drive the loop for one task against already-started capabilities.
    pub async fn drive(&self, task: &str) -> Result<RunResult, ProviderError> {
        let mut history = Conversation::with_system(self.render_system_prompt(task).await);
        history.push(Message::user(prompts::task_message(task)));

        let mut rounds = 0;
        let mut state = LoopState::BuildingPrompt;

        loop {
            debug!(agent = %self.name, round = rounds, state = state_name(&state), "Loop transition");
            state = match state {
                LoopState::BuildingPrompt => {
                    if rounds >= self.max_rounds {
                        LoopState::Exhausted
                    } else {
                        rounds += 1;
                        self.events.publish(DomainEvent::RoundStarted {
                            agent_name: self.name.clone(),
                            round: rounds,
                            timestamp: Utc::now(),
                        });
                        history.push(Message::user(prompts::STEP_INSTRUCTION));
                        LoopState::AwaitingModel
                    }
                }

                LoopState::AwaitingModel => {
                    let request = self.request(history.messages().to_vec(), Vec::new());
                    let response = self.provider.complete(request).await?;
                    self.events.publish(DomainEvent::ResponseReceived {
                        agent_name: self.name.clone(),
                        model: response.model.clone(),
                        tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
                        timestamp: Utc::now(),
                    });
                    LoopState::InspectingOutput(response.message)
                }

                LoopState::InspectingOutput(message) => {
                    let text = message.content;
                    history.push(Message::assistant(text.clone()));

                    if let Some(answer) = FINAL_ANSWER.extract(&text) {
                        LoopState::Finished(answer.to_string())
                    } else if let Some(selection) = self.marker.marker().extract(&text) {
                        LoopState::Dispatching(selection.to_string())
                    } else {
                        LoopState::Continuing
                    }
                }

                LoopState::Dispatching(selection) => {
                    self.dispatch(&selection, &mut history).await?;
                    LoopState::Continuing
                }

                LoopState::Continuing => LoopState::BuildingPrompt,

                LoopState::Finished(answer) => {
                    return Ok(self.finish(RunStatus::Finished, answer, rounds, history));
                }

                LoopState::Exhausted => {
                    warn!(agent = %self.name, rounds, "Step budget exhausted without a final answer");
                    return Ok(self.finish(RunStatus::Exhausted, String::new(), rounds, history));
                }
            };
        }
    }

    /// Resolve a selection, elicit its parameters, and run the calls.
    async fn dispatch(&self, selection: &str, history: &mut Conversation) -> Result<(), ProviderError> {
        let Some(capability) = self.registry.resolve(selection).await else {
            self.recover(history, &ToolError::UnknownCapability(selection.to_string()));
            return Ok(());
        };

        info!(agent = %self.name, capability = %selection, "Capability selected");
        self.events.publish(DomainEvent::CapabilitySelected {
            agent_name: self.name.clone(),
            capability: selection.to_string(),
            timestamp: Utc::now(),
        });

        let descriptors = capability.descriptors().await;
        if descriptors.is_empty() {
            self.recover(
                history,
                &ToolError::ExecutionFailed {
                    tool_name: selection.to_string(),
                    reason: "no tools are currently available".into(),
                },
            );
            return Ok(());
        }

        let target = match descriptors.as_slice() {
            [only] => only.name.clone(),
            _ => selection.to_string(),
        };

        // The elicitation instruction is sent once and not kept in history
        let mut messages = history.messages().to_vec();
        messages.push(Message::user(prompts::elicitation_instruction(&target)));
        let schemas: Vec<ToolDescriptor> = descriptors.iter().map(ToolDescriptor::to_strict).collect();
        let response = self.provider.complete(self.request(messages, schemas)).await?;

        let calls = match decode_tool_calls(&response.message) {
            Ok(calls) => calls,
            Err(e) => {
                self.recover(history, &e);
                return Ok(());
            }
        };

        for call in calls {
            if !descriptors.iter().any(|d| d.name == call.name) {
                self.recover(history, &ToolError::UnknownTool(call.name.clone()));
                continue;
            }

            debug!(agent = %self.name, tool = %call.name, call_id = %call.call_id, "Invoking");
            match capability.invoke(&call).await {
                Ok(result) => {
                    history.push(Message::assistant(prompts::tool_result(
                        &call.name,
                        &call.arguments(),
                        &result,
                    )));
                }
                Err(ToolError::Model(e)) => return Err(e),
                Err(e) => self.recover(history, &e),
            }
        }

        Ok(())
    }

    /// Record a recoverable failure and keep going.
    fn recover(&self, history: &mut Conversation, error: &ToolError) {
        warn!(agent = %self.name, error = %error, "Recoverable error, continuing");
        self.events.publish(DomainEvent::RecoverableError {
            agent_name: self.name.clone(),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });
        history.push(Message::assistant(prompts::error_notice(error)));
    }

    fn finish(&self, status: RunStatus, result: String, rounds: usize, history: Conversation) -> RunResult {
        info!(agent = %self.name, %status, rounds, "Run finished");
        self.events.publish(DomainEvent::RunFinished {
            agent_name: self.name.clone(),
            status: status.to_string(),
            rounds,
            timestamp: Utc::now(),
        });
        RunResult {
            agent_name: self.name.clone(),
            status,
            result,
            rounds,
            history,
        }
    }

    async fn render_system_prompt(&self, task: &str) -> String {
        let hints = self.registry.hints().await;
        prompts::system_prompt(&self.role_prompt, task, &hints, self.marker)
    }

    fn request(&self, messages: Vec<Message>, tools: Vec<ToolDescriptor>) -> ProviderRequest {
        ProviderRequest {
            agent_name: self.name.clone(),
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }
}

fn state_name(state: &LoopState) -> &'static str {
    match state {
        LoopState::BuildingPrompt => "building_prompt",
        LoopState::AwaitingModel => "awaiting_model",
        LoopState::InspectingOutput(_) => "inspecting_output",
        LoopState::Dispatching(_) => "dispatching",
        LoopState::Continuing => "continuing",
        LoopState::Finished(_) => "finished",
        LoopState::Exhausted => "exhausted",
    }
}
