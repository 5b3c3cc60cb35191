//! Response decoding — markers in free text, and tool calls in either of
//! the two shapes a backend may use.
//!
//! **Shape A**: the backend fills the message's native `tool_calls` field.
//! **Shape B**: the backend answers in plain text that itself contains the
//! call, as a JSON object or array (optionally inside a code fence).
//!
//! Shape A wins whenever it is present; Shape B is only tried when the
//! native field is empty.

use serde_json::{Map, Value};
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::tool::ToolCallRequest;

/// An opening/closing tag pair of the marker protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub open: &'static str,
    pub close: &'static str,
}

impl Marker {
    /// The trimmed content of the first `open … close` span in `text`.
    pub fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        extract_span(text, self.open, self.close)
    }

    /// Wrap `content` in this marker.
    pub fn wrap(&self, content: &str) -> String {
        format!("{}{}{}", self.open, content, self.close)
    }
}

pub const FINAL_ANSWER: Marker = Marker {
    open: "<FINAL_ANSWER>",
    close: "</FINAL_ANSWER>",
};

pub const WORKER: Marker = Marker {
    open: "<WORKER>",
    close: "</WORKER>",
};

pub const TOOL: Marker = Marker {
    open: "<TOOL>",
    close: "</TOOL>",
};

/// Which selection tag a loop listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMarker {
    /// `<WORKER>…</WORKER>`, used by the top-level orchestrator
    Worker,
    /// `<TOOL>…</TOOL>`, used inside a worker
    Tool,
}

impl SelectionMarker {
    pub fn marker(&self) -> Marker {
        match self {
            SelectionMarker::Worker => WORKER,
            SelectionMarker::Tool => TOOL,
        }
    }

    /// What the selected things are called in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            SelectionMarker::Worker => "worker",
            SelectionMarker::Tool => "tool",
        }
    }
}

/// Extract the content between the first `open` and the first `close`
/// after it. An opening tag without a matching close counts as absent.
pub fn extract_span<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let rest = &text[start..];
    let end = rest.find(close)?;
    Some(rest[..end].trim())
}

/// Decode every tool call carried by a model response.
pub fn decode_tool_calls(message: &Message) -> Result<Vec<ToolCallRequest>, ToolError> {
    if !message.tool_calls.is_empty() {
        return message
            .tool_calls
            .iter()
            .map(|tc| {
                let parameters = parse_arguments(&Value::String(tc.arguments.clone()))
                    .map_err(|reason| ToolError::MalformedToolCall(format!("{}: {reason}", tc.name)))?;
                Ok(if tc.id.is_empty() {
                    ToolCallRequest::new(tc.name.clone(), parameters)
                } else {
                    ToolCallRequest::with_call_id(tc.name.clone(), parameters, tc.id.clone())
                })
            })
            .collect();
    }

    decode_inline(&message.content)
}

/// Decode Shape B: a JSON object or array embedded in text.
///
/// Every JSON value found in the text is tried in order; the first one that
/// decodes as a call wins.
pub fn decode_inline(text: &str) -> Result<Vec<ToolCallRequest>, ToolError> {
    let mut first_error = None;
    for value in json_candidates(text) {
        match decode_value(&value) {
            Ok(calls) => return Ok(calls),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error
        .unwrap_or_else(|| ToolError::MalformedToolCall("no JSON tool call found in response".into())))
}

fn decode_value(value: &Value) -> Result<Vec<ToolCallRequest>, ToolError> {
    let calls = match value {
        Value::Array(items) => items
            .iter()
            .map(decode_call_object)
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(obj) => match obj.get("tool_calls") {
            Some(Value::Array(items)) => items
                .iter()
                .map(decode_call_object)
                .collect::<Result<Vec<_>, _>>()?,
            _ => vec![decode_call_object(value)?],
        },
        other => {
            return Err(ToolError::MalformedToolCall(format!(
                "expected an object or array, got {other}"
            )));
        }
    };

    if calls.is_empty() {
        return Err(ToolError::MalformedToolCall("empty tool call list".into()));
    }
    Ok(calls)
}

fn decode_call_object(value: &Value) -> Result<ToolCallRequest, ToolError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ToolError::MalformedToolCall(format!("tool call is not an object: {value}")))?;

    // OpenAI-style {"function": {"name", "arguments"}} nesting
    let body = obj.get("function").and_then(Value::as_object).unwrap_or(obj);

    let name = body
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ToolError::MalformedToolCall("tool call has no name".into()))?;

    let parameters = match body.get("arguments").or_else(|| body.get("parameters")) {
        Some(raw) => parse_arguments(raw)
            .map_err(|reason| ToolError::MalformedToolCall(format!("{name}: {reason}")))?,
        None => Map::new(),
    };

    let call_id = obj
        .get("id")
        .or_else(|| obj.get("call_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());

    Ok(match call_id {
        Some(id) => ToolCallRequest::with_call_id(name, parameters, id),
        None => ToolCallRequest::new(name, parameters),
    })
}

/// Arguments arrive as an object, or as a string holding one.
fn parse_arguments(raw: &Value) -> Result<Map<String, Value>, String> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => {
            let parsed: Value =
                serde_json::from_str(s).map_err(|e| format!("arguments are not valid JSON: {e}"))?;
            match parsed {
                // Some backends double-encode
                Value::String(_) => parse_arguments(&parsed),
                Value::Object(map) => Ok(map),
                other => Err(format!("arguments must be an object, got {other}")),
            }
        }
        other => Err(format!("arguments must be an object, got {other}")),
    }
}

/// JSON values in a model answer, most likely payload first: a fenced
/// block, the whole answer, then the first value starting at each `{` or
/// `[` in the text.
fn json_candidates(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    let mut candidates = Vec::new();

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced) {
            candidates.push(value);
        }
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        candidates.push(value);
        return candidates;
    }

    for (start, _) in trimmed.match_indices(['{', '[']) {
        let mut stream = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            candidates.push(value);
        }
    }
    candidates
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    // Skip the info string (e.g. "json") up to the end of the fence line
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}
