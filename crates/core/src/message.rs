//! Messages and the run history.
//!
//! History is append-only and totally ordered: system prompt, task, then per
//! round the step instruction, the raw model answer, and whatever the
//! dispatch produced (tool results or error notices).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one run's history in logs and events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Role prompt, capability hints, marker protocol
    System,
    /// Instructions the loop feeds to the model
    User,
    /// Model output, tool results and error notices
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,

    /// Native tool calls, when the backend returned structured ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// A backend-native tool call attached to an assistant message.
///
/// `arguments` is kept exactly as the backend sent it: usually a JSON
/// document encoded as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Backend-issued call id; may be empty
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// The ordered history of one run. Messages can only be appended, and a
/// system message, if any, is always the first one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// A history that opens with `prompt` as its system message.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.messages.push(Message::system(prompt));
        conv
    }

    /// Append a message. A system message arriving after the first
    /// position is demoted to a user message.
    pub fn push(&mut self, mut message: Message) {
        if message.role == Role::System && !self.messages.is_empty() {
            tracing::warn!(
                conversation_id = %self.id,
                "System message appended mid-run, demoting to user"
            );
            message.role = Role::User;
        }
        self.messages.push(message);
    }

    /// Oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_has_no_tool_calls() {
        let msg = Message::user("Identify the next step");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Identify the next step");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let mut conv = Conversation::with_system("You are an orchestrator");
        conv.push(Message::user("Task: add"));
        conv.push(Message::assistant("<WORKER>calc</WORKER>"));

        let contents: Vec<&str> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["You are an orchestrator", "Task: add", "<WORKER>calc</WORKER>"]);
        assert_eq!(conv.last().map(|m| m.role), Some(Role::Assistant));
    }

    #[test]
    fn system_prompt_stays_first() {
        let mut conv = Conversation::with_system("You are an orchestrator");
        conv.push(Message::user("task"));
        conv.push(Message::system("late instructions"));

        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[2].role, Role::User);
        assert_eq!(conv.messages()[2].content, "late instructions");
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = Message::assistant("done");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_calls").is_none());
    }
}
