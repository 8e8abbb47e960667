//! Pure helpers for the compounding summary carried between agent runs.

use crate::core::message::{Conversation, Role};

const REPLY_EXCERPT_CHARS: usize = 400;

/// What an agent run did, reduced to what the summary needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnAction {
    /// Distinct tool names in first-use order.
    pub tools: Vec<String>,
    /// Excerpt of the final assistant reply.
    pub reply: String,
}

impl TurnAction {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.reply.trim().is_empty()
    }

    /// Terse, single-line description fed to the summarizer.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.tools.is_empty() {
            parts.push(format!("invoked tools: {}", self.tools.join(", ")));
        }
        let reply = self.reply.trim();
        if !reply.is_empty() {
            parts.push(format!("produced a direct response: {reply}"));
        }
        parts.join("; ")
    }
}

/// Describe the assistant turns of a finished conversation.
pub fn describe_turns(conversation: &Conversation) -> TurnAction {
    let mut tools: Vec<String> = Vec::new();
    for message in conversation.messages() {
        if message.role != Role::Assistant {
            continue;
        }
        for invocation in &message.invocations {
            if !tools.contains(&invocation.name) {
                tools.push(invocation.name.clone());
            }
        }
    }
    let reply = conversation
        .last_assistant()
        .map(|message| excerpt(message.content.trim(), REPLY_EXCERPT_CHARS))
        .unwrap_or_default();
    TurnAction { tools, reply }
}

/// Keep at most `max_sentences` sentences and `max_chars` characters.
pub fn clamp_summary(text: &str, max_sentences: usize, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = collapsed.len();
    let mut sentences = 0usize;
    let mut chars = collapsed.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| *next == ' ');
            if at_boundary {
                sentences += 1;
                if sentences >= max_sentences {
                    end = idx + ch.len_utf8();
                    break;
                }
            }
        }
    }
    excerpt(&collapsed[..end], max_chars)
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{Message, ToolInvocation};
    use serde_json::json;

    #[test]
    fn describe_turns_lists_distinct_tools_in_order() {
        let mut conversation = Conversation::new("sys");
        conversation.push(Message::human("task"));
        conversation.push(Message::assistant(
            "",
            vec![
                ToolInvocation::new("c1", "write_project_file", json!({})),
                ToolInvocation::new("c2", "install_dependencies", json!({})),
            ],
        ));
        conversation.push(Message::tool_result("c1", "ok"));
        conversation.push(Message::tool_result("c2", "ok"));
        conversation.push(Message::assistant(
            "",
            vec![ToolInvocation::new("c3", "write_project_file", json!({}))],
        ));
        conversation.push(Message::tool_result("c3", "ok"));
        conversation.push(Message::assistant("Created the layout.", Vec::new()));

        let action = describe_turns(&conversation);
        assert_eq!(action.tools, vec!["write_project_file", "install_dependencies"]);
        assert_eq!(
            action.describe(),
            "invoked tools: write_project_file, install_dependencies; produced a direct response: Created the layout."
        );
    }

    #[test]
    fn conversation_without_assistant_turn_is_empty_action() {
        let conversation = Conversation::new("sys");
        assert!(describe_turns(&conversation).is_empty());
    }

    #[test]
    fn clamp_keeps_first_sentences() {
        let text = "One. Two!  Three?\nFour. Five.";
        assert_eq!(clamp_summary(text, 3, 1000), "One. Two! Three?");
    }

    #[test]
    fn clamp_ignores_dots_inside_words() {
        let text = "Edited src/app/page.tsx and layout.tsx. Installed zod.";
        assert_eq!(
            clamp_summary(text, 1, 1000),
            "Edited src/app/page.tsx and layout.tsx."
        );
    }

    #[test]
    fn clamp_caps_characters_on_char_boundary() {
        let text = "é".repeat(50);
        let clamped = clamp_summary(&text, 3, 10);
        assert_eq!(clamped.chars().count(), 10);
    }
}
