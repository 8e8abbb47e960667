//! Conversation model shared by every agent loop.
//!
//! A [`Conversation`] is append-only and always starts with the system message
//! that defines the active agent's role. Tool-role messages answer exactly one
//! [`ToolInvocation`] from the assistant turn that precedes them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A reasoning engine's request to call a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Pending tool invocations (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
    /// Invocation id this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::plain(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>, invocations: Vec<ToolInvocation>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            invocations,
            answers: None,
        }
    }

    pub fn tool_result(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            invocations: Vec::new(),
            answers: Some(invocation_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            invocations: Vec::new(),
            answers: None,
        }
    }

    pub fn has_invocations(&self) -> bool {
        self.role == Role::Assistant && !self.invocations.is_empty()
    }
}

/// Ordered, append-only message history with the system message at index 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

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

    /// Invocations of the latest message, if it is an assistant turn.
    pub fn pending_invocations(&self) -> &[ToolInvocation] {
        match self.messages.last() {
            Some(message) if message.role == Role::Assistant => &message.invocations,
            _ => &[],
        }
    }

    /// The most recent assistant message.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_conversation_starts_with_system_message() {
        let conversation = Conversation::new("you plan");
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[0].content, "you plan");
    }

    #[test]
    fn pending_invocations_only_reads_latest_assistant_turn() {
        let mut conversation = Conversation::new("sys");
        conversation.push(Message::assistant(
            "",
            vec![ToolInvocation::new("call_1", "read_project_file", json!({}))],
        ));
        assert_eq!(conversation.pending_invocations().len(), 1);

        conversation.push(Message::tool_result("call_1", "contents"));
        assert!(conversation.pending_invocations().is_empty());
    }

    #[test]
    fn non_object_arguments_become_empty_map() {
        let invocation = ToolInvocation::new("call_1", "list_dependencies", json!(null));
        assert!(invocation.arguments.is_empty());
    }

    #[test]
    fn serializes_roles_lowercase_and_skips_empty_fields() {
        let value = serde_json::to_value(Message::human("hi")).expect("serialize");
        assert_eq!(value, json!({ "role": "human", "content": "hi" }));
    }
}
