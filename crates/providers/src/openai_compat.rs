//! OpenAI-compatible chat completions client.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. Free-form steps go out without `tools`; elicitation
//! requests carry the selected capability's schemas, and any native
//! `tool_calls` in the answer come back on the response message.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use stepwise_config::AppConfig;
use stepwise_core::error::ProviderError;
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tracing::{debug, warn};

/// A chat-completions backend reached over HTTP.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Build the client described by the application config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key: set api_key in config.toml or STEPWISE_API_KEY".into(),
            )
        })?;
        Ok(Self::new("openai-compat", config.base_url.clone(), api_key))
    }

    /// How many times a rate-limited or network-failed request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let messages: Vec<wire::ChatMessage> =
            request.messages.iter().map(wire::ChatMessage::from).collect();
        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            let tools: Vec<wire::ToolDefinition> =
                request.tools.iter().map(wire::ToolDefinition::from).collect();
            body["tools"] = json!(tools);
        }
        body
    }

    /// The error a non-success status stands for.
    fn status_error(status: u16, body: String) -> Option<ProviderError> {
        match status {
            200..=299 => None,
            429 => Some(ProviderError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => Some(ProviderError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            )),
            _ => Some(ProviderError::ApiError {
                status_code: status,
                message: body,
            }),
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if let Some(err) = Self::status_error(status, String::new()) {
            let detail = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %detail, "Completion request rejected");
            return Err(match err {
                ProviderError::ApiError { status_code, .. } => ProviderError::ApiError {
                    status_code,
                    message: detail,
                },
                other => other,
            });
        }

        let completion: wire::Completion =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: status,
                message: format!("unreadable completion: {e}"),
            })?;
        completion.into_response()
    }
}

fn is_retryable(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::RateLimited { .. } | ProviderError::Network(_) | ProviderError::Timeout(_)
    )
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            agent = %request.agent_name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(response) => return Ok(response),
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(provider = %self.name, attempt, error = %e, "Retrying completion request");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// The chat-completions wire format.
mod wire {
    use serde::{Deserialize, Serialize};
    use stepwise_core::error::ProviderError;
    use stepwise_core::message::{Message, MessageToolCall, Role};
    use stepwise_core::provider::{ProviderResponse, Usage};
    use stepwise_core::tool::ToolDescriptor;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_calls: Option<Vec<FunctionCall>>,
    }

    impl From<&Message> for ChatMessage {
        fn from(message: &Message) -> Self {
            Self {
                role: message.role,
                content: Some(message.content.clone()),
                tool_calls: (!message.tool_calls.is_empty()).then(|| {
                    message
                        .tool_calls
                        .iter()
                        .map(|tc| FunctionCall {
                            id: tc.id.clone(),
                            kind: "function".into(),
                            function: FunctionBody {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                }),
            }
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FunctionCall {
        #[serde(default)]
        pub id: String,
        #[serde(rename = "type", default = "function_kind")]
        pub kind: String,
        pub function: FunctionBody,
    }

    fn function_kind() -> String {
        "function".into()
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FunctionBody {
        pub name: String,
        #[serde(default)]
        pub arguments: String,
    }

    #[derive(Debug, Serialize)]
    pub struct ToolDefinition {
        #[serde(rename = "type")]
        pub kind: &'static str,
        pub function: ToolFunction,
    }

    #[derive(Debug, Serialize)]
    pub struct ToolFunction {
        pub name: String,
        pub description: String,
        pub parameters: serde_json::Value,
    }

    impl From<&ToolDescriptor> for ToolDefinition {
        fn from(descriptor: &ToolDescriptor) -> Self {
            Self {
                kind: "function",
                function: ToolFunction {
                    name: descriptor.name.clone(),
                    description: descriptor.description.clone(),
                    parameters: descriptor.strict_schema(),
                },
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Completion {
        #[serde(default)]
        pub model: String,
        pub choices: Vec<Choice>,
        pub usage: Option<TokenUsage>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Choice {
        pub message: ChatMessage,
    }

    #[derive(Debug, Deserialize)]
    pub struct TokenUsage {
        pub prompt_tokens: u32,
        pub completion_tokens: u32,
        pub total_tokens: u32,
    }

    impl Completion {
        pub fn into_response(self) -> Result<ProviderResponse, ProviderError> {
            let choice = self.choices.into_iter().next().ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "completion has no choices".into(),
            })?;

            let mut message = Message::assistant(choice.message.content.unwrap_or_default());
            message.tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| MessageToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect();

            Ok(ProviderResponse {
                message,
                usage: self.usage.map(|u| Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                }),
                model: self.model,
            })
        }
    }
}
