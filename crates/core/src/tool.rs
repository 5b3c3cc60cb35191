//! Tool descriptors, tool call requests, and the in-process Tool trait.
//!
//! A [`ToolDescriptor`] is the canonical description of one invocable
//! capability, whatever process actually hosts it. Descriptors are rendered
//! two ways: a one-line hint for the system prompt (every tool, up front) and
//! a strict parameter schema for the elicitation call (only the tool that
//! was selected).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use crate::error::ToolError;

/// Description of one tool exposed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name, unique within one connection pool
    pub name: String,

    /// What the tool does (sent to the model)
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(alias = "inputSchema", alias = "input_schema", alias = "parameters")]
    pub schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    /// Human-readable hint, e.g. `"add: Add two numbers"`.
    pub fn hint(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.description)
        }
    }

    /// The parameter schema as handed to the model, without the `$schema`
    /// meta key that some providers attach.
    pub fn strict_schema(&self) -> Value {
        let mut schema = self.schema.clone();
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        schema
    }

    /// A copy of this descriptor carrying the strict schema.
    pub fn to_strict(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.strict_schema(),
        }
    }
}

/// A canonical request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the tool to execute
    pub name: String,

    /// Named parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Correlates the provider's result back to this request
    pub call_id: String,
}

impl ToolCallRequest {
    /// Create a request with a freshly generated call ID.
    pub fn new(name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
            call_id: Self::generate_call_id(),
        }
    }

    /// Create a request that keeps the source's call ID.
    pub fn with_call_id(
        name: impl Into<String>,
        parameters: Map<String, Value>,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            call_id: call_id.into(),
        }
    }

    /// A new `call_<uuid>` identifier.
    pub fn generate_call_id() -> String {
        format!("call_{}", Uuid::new_v4().simple())
    }

    /// The parameters as a JSON object value.
    pub fn arguments(&self) -> Value {
        Value::Object(self.parameters.clone())
    }
}

/// An in-process tool.
///
/// Hosted by a local provider connection so that Rust-native tools share the
/// same discovery and dispatch path as out-of-process providers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "add").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments and return its text output.
    async fn execute(&self, arguments: Value) -> std::result::Result<String, ToolError>;

    /// Describe this tool.
    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            schema: self.parameters_schema(),
        }
    }
}
