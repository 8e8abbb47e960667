//! Tool-calling reasoning loop shared by the planner, task executor and healer.
//!
//! The loop alternates between a reasoning step (one engine call) and a tool
//! execution step (answer every invocation of that turn, in order). It ends
//! when the engine replies without invocations or the step limit is reached.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::invariants::validate_conversation;
use crate::core::message::{Conversation, Message, Role, ToolInvocation};
use crate::io::engine::Engine;
use crate::tools::{Dispatch, ToolRegistry};

pub const DEFAULT_MAX_REASONING_STEPS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLoopConfig {
    /// Upper bound on engine calls for one loop.
    pub max_reasoning_steps: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_reasoning_steps: DEFAULT_MAX_REASONING_STEPS,
        }
    }
}

/// Reason why `run_agent_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The engine produced a turn without tool invocations.
    Done,
    /// The engine was still requesting tools when the step limit was reached.
    StepLimitReached { max_reasoning_steps: usize },
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub conversation: Conversation,
    pub reasoning_steps: usize,
    pub stop: LoopStop,
}

enum LoopState {
    Reasoning,
    ToolExecution,
    Done,
}

/// Drive `conversation` until the engine stops requesting tools.
///
/// Tool failures (unknown tool, invalid arguments, errors) are answered as text
/// and never end the loop. Engine failures propagate.
#[instrument(skip_all, fields(tools = tools.len(), max_steps = config.max_reasoning_steps))]
pub fn run_agent_loop<E: Engine + ?Sized>(
    engine: &E,
    mut conversation: Conversation,
    tools: &ToolRegistry,
    config: &AgentLoopConfig,
) -> Result<LoopOutcome> {
    let schemas = tools.schemas();
    let mut reasoning_steps = 0usize;
    let mut state = if conversation.pending_invocations().is_empty() {
        LoopState::Reasoning
    } else {
        LoopState::ToolExecution
    };

    let stop = loop {
        match state {
            LoopState::Reasoning => {
                if reasoning_steps >= config.max_reasoning_steps {
                    warn!(
                        max_reasoning_steps = config.max_reasoning_steps,
                        "agent loop reached its step limit"
                    );
                    break LoopStop::StepLimitReached {
                        max_reasoning_steps: config.max_reasoning_steps,
                    };
                }
                let reply = engine
                    .infer(conversation.messages(), &schemas)
                    .with_context(|| format!("reasoning step {}", reasoning_steps + 1))?;
                reasoning_steps += 1;
                if reply.role != Role::Assistant {
                    bail!(
                        "engine returned a {} message instead of an assistant turn",
                        reply.role.as_str()
                    );
                }
                let reply = with_unique_ids(reply, reasoning_steps);
                debug!(
                    step = reasoning_steps,
                    invocations = reply.invocations.len(),
                    "assistant turn"
                );
                state = if reply.has_invocations() {
                    LoopState::ToolExecution
                } else {
                    LoopState::Done
                };
                conversation.push(reply);
            }
            LoopState::ToolExecution => {
                let invocations = conversation.pending_invocations().to_vec();
                for invocation in &invocations {
                    let result = answer_invocation(tools, invocation);
                    conversation.push(Message::tool_result(invocation.id.clone(), result));
                }
                state = LoopState::Reasoning;
            }
            LoopState::Done => break LoopStop::Done,
        }
    };

    let violations = validate_conversation(&conversation);
    if !violations.is_empty() {
        bail!("conversation invariants failed: {}", violations.join("; "));
    }
    Ok(LoopOutcome {
        conversation,
        reasoning_steps,
        stop,
    })
}

/// Run one invocation and render its outcome as the tool-role reply text.
pub fn answer_invocation(tools: &ToolRegistry, invocation: &ToolInvocation) -> String {
    let name = invocation.name.as_str();
    match tools.dispatch(name, &invocation.arguments) {
        Dispatch::NotFound => {
            warn!(tool = name, "engine requested an unknown tool");
            format!("Error: Tool '{name}' not found")
        }
        Dispatch::Rejected(violations) => {
            warn!(tool = name, "tool arguments rejected");
            format!("Tool '{name}' rejected arguments: {}", violations.join("; "))
        }
        Dispatch::Completed(Ok(text)) => {
            debug!(tool = name, bytes = text.len(), "tool completed");
            text
        }
        Dispatch::Completed(Err(err)) => {
            warn!(tool = name, err = %format!("{err:#}"), "tool failed");
            format!("Tool '{name}' crashed: {err:#}")
        }
    }
}

/// Give every invocation of a turn a distinct, non-empty id so each is
/// executed and answered exactly once.
fn with_unique_ids(mut reply: Message, step: usize) -> Message {
    let mut seen = HashSet::new();
    for (idx, invocation) in reply.invocations.iter_mut().enumerate() {
        if invocation.id.trim().is_empty() || seen.contains(&invocation.id) {
            invocation.id = format!("step{step}_call{idx}");
        }
        seen.insert(invocation.id.clone());
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CallLog, RecordingTool, ScriptedEngine, ScriptedReply};
    use serde_json::json;

    fn registry(log: &CallLog) -> ToolRegistry {
        ToolRegistry::new()
            .with(RecordingTool::new("write_project_file", log.clone()))
            .expect("registry")
    }

    #[test]
    fn direct_reply_finishes_after_one_step() {
        let engine = ScriptedEngine::new(vec![ScriptedReply::text("nothing to do")]);
        let log = CallLog::default();
        let outcome = run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .expect("loop");
        assert_eq!(outcome.stop, LoopStop::Done);
        assert_eq!(outcome.reasoning_steps, 1);
        assert_eq!(outcome.conversation.len(), 2);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn unknown_tool_is_answered_and_loop_continues() {
        let engine = ScriptedEngine::new(vec![
            ScriptedReply::calls(vec![("nonexistent_tool", json!({}))]),
            ScriptedReply::text("understood"),
        ]);
        let log = CallLog::default();
        let outcome = run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .expect("loop");

        assert_eq!(outcome.stop, LoopStop::Done);
        let reply = &outcome.conversation.messages()[2];
        assert_eq!(reply.role, Role::Tool);
        assert_eq!(reply.content, "Error: Tool 'nonexistent_tool' not found");
        assert_eq!(
            outcome.conversation.last().map(|m| m.content.as_str()),
            Some("understood")
        );
    }

    #[test]
    fn failing_tool_is_reported_as_crash() {
        let log = CallLog::default();
        let tools = ToolRegistry::new()
            .with(RecordingTool::failing("install_dependencies", log.clone(), "npm exploded"))
            .expect("registry");
        let engine = ScriptedEngine::new(vec![
            ScriptedReply::calls(vec![("install_dependencies", json!({ "packages": ["zod"] }))]),
            ScriptedReply::text("giving up"),
        ]);
        let outcome =
            run_agent_loop(&engine, Conversation::new("sys"), &tools, &AgentLoopConfig::default())
                .expect("loop");
        assert_eq!(
            outcome.conversation.messages()[2].content,
            "Tool 'install_dependencies' crashed: npm exploded"
        );
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn invocations_are_answered_in_order_with_matching_ids() {
        let log = CallLog::default();
        let engine = ScriptedEngine::new(vec![
            ScriptedReply::calls(vec![
                ("write_project_file", json!({ "path": "/a" })),
                ("write_project_file", json!({ "path": "/b" })),
            ]),
            ScriptedReply::text("done"),
        ]);
        let outcome = run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .expect("loop");
        let messages = outcome.conversation.messages();
        let ids: Vec<&str> = messages[1].invocations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(messages[2].answers.as_deref(), Some(ids[0]));
        assert_eq!(messages[3].answers.as_deref(), Some(ids[1]));
        assert_eq!(
            log.entries(),
            vec![
                r#"write_project_file {"path":"/a"}"#,
                r#"write_project_file {"path":"/b"}"#
            ]
        );
    }

    #[test]
    fn duplicate_invocation_ids_are_executed_once_each() {
        let log = CallLog::default();
        let engine = ScriptedEngine::new(vec![
            ScriptedReply::Turn(Message::assistant(
                "",
                vec![
                    ToolInvocation::new("dup", "write_project_file", json!({ "path": "/a" })),
                    ToolInvocation::new("dup", "write_project_file", json!({ "path": "/b" })),
                ],
            )),
            ScriptedReply::text("done"),
        ]);
        let outcome = run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .expect("loop");
        assert_eq!(log.entries().len(), 2);
        assert!(validate_conversation(&outcome.conversation).is_empty());
    }

    #[test]
    fn step_limit_stops_a_tool_happy_engine() {
        let log = CallLog::default();
        let engine = ScriptedEngine::new(
            (0..3)
                .map(|_| ScriptedReply::calls(vec![("write_project_file", json!({}))]))
                .collect(),
        );
        let config = AgentLoopConfig {
            max_reasoning_steps: 3,
        };
        let outcome =
            run_agent_loop(&engine, Conversation::new("sys"), &registry(&log), &config)
                .expect("loop");
        assert_eq!(
            outcome.stop,
            LoopStop::StepLimitReached {
                max_reasoning_steps: 3
            }
        );
        assert_eq!(outcome.reasoning_steps, 3);
        assert_eq!(log.entries().len(), 3);
        assert_eq!(engine.calls().len(), 3);
    }

    #[test]
    fn engine_failure_propagates() {
        let engine = ScriptedEngine::new(vec![ScriptedReply::Fail("connection refused".into())]);
        let log = CallLog::default();
        let err = run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .unwrap_err();
        assert_eq!(format!("{err:#}"), "reasoning step 1: connection refused");
    }

    #[test]
    fn tools_are_advertised_to_the_engine() {
        let engine = ScriptedEngine::new(vec![ScriptedReply::text("ok")]);
        let log = CallLog::default();
        run_agent_loop(
            &engine,
            Conversation::new("sys"),
            &registry(&log),
            &AgentLoopConfig::default(),
        )
        .expect("loop");
        assert_eq!(engine.calls()[0].tools, vec!["write_project_file"]);
    }
}
