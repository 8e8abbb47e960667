//! Structural invariants for conversations.

use std::collections::HashSet;

use crate::core::message::{Conversation, Role};

/// Check conversation invariants:
/// - Index 0 is the system message
/// - Every tool message answers a pending invocation of the immediately preceding assistant turn
/// - No invocation is answered twice
/// - No new turn starts while invocations are still unanswered
///
/// Trailing unanswered invocations are allowed (the loop has not executed them yet).
pub fn validate_conversation(conversation: &Conversation) -> Vec<String> {
    let mut errors = Vec::new();
    let messages = conversation.messages();

    match messages.first() {
        Some(first) if first.role == Role::System => {}
        Some(first) => errors.push(format!(
            "message 0 must be the system message, found {}",
            first.role.as_str()
        )),
        None => errors.push("conversation is empty".to_string()),
    }

    // (assistant index, pending ids, answered ids)
    let mut open: Option<(usize, Vec<&str>, HashSet<&str>)> = None;

    for (idx, message) in messages.iter().enumerate() {
        match message.role {
            Role::Tool => {
                let Some(id) = message.answers.as_deref() else {
                    errors.push(format!("message {idx}: tool message without invocation id"));
                    continue;
                };
                let Some((assistant_idx, pending, answered)) = open.as_mut() else {
                    errors.push(format!(
                        "message {idx}: orphaned tool reply '{id}' (no preceding assistant turn)"
                    ));
                    continue;
                };
                if !pending.contains(&id) {
                    errors.push(format!(
                        "message {idx}: tool reply '{id}' does not match any invocation of message {assistant_idx}"
                    ));
                } else if !answered.insert(id) {
                    errors.push(format!("message {idx}: invocation '{id}' answered twice"));
                }
            }
            Role::System | Role::Human | Role::Assistant => {
                if let Some((assistant_idx, pending, answered)) = open.take() {
                    let unanswered: Vec<&str> = pending
                        .iter()
                        .copied()
                        .filter(|id| !answered.contains(id))
                        .collect();
                    if !unanswered.is_empty() {
                        errors.push(format!(
                            "message {idx}: new turn while message {assistant_idx} has unanswered invocations [{}]",
                            unanswered.join(", ")
                        ));
                    }
                }
                if idx > 0 && message.role == Role::System {
                    errors.push(format!("message {idx}: system message after index 0"));
                }
                if message.has_invocations() {
                    let pending = message
                        .invocations
                        .iter()
                        .map(|invocation| invocation.id.as_str())
                        .collect();
                    open = Some((idx, pending, HashSet::new()));
                }
            }
        }
    }

    errors
}
