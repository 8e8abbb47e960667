//! Agent stages built on one tool-calling loop.
//!
//! The planner, task executor and healer differ only in their system prompt,
//! their seed message and the tools they are given.

pub mod agent_loop;
pub mod healer;
pub mod planner;
pub mod summary;
pub mod task;

use anyhow::Result;
use tracing::warn;

use crate::agents::agent_loop::{AgentLoopConfig, LoopStop, run_agent_loop};
use crate::agents::summary::SummaryCarrier;
use crate::core::message::{Conversation, Message};
use crate::core::summary::describe_turns;
use crate::io::engine::Engine;
use crate::tools::ToolRegistry;

/// Run one fresh conversation (`system` + `seed`) to completion and fold what
/// it did into `carry`. The conversation is dropped; only the carry survives.
pub(crate) fn run_and_summarize<E: Engine + ?Sized>(
    engine: &E,
    system: String,
    seed: String,
    tools: &ToolRegistry,
    loop_config: &AgentLoopConfig,
    carrier: &SummaryCarrier<'_, E>,
    carry: &str,
) -> Result<String> {
    let mut conversation = Conversation::new(system);
    conversation.push(Message::human(seed));
    let outcome = run_agent_loop(engine, conversation, tools, loop_config)?;
    if let LoopStop::StepLimitReached { max_reasoning_steps } = outcome.stop {
        warn!(max_reasoning_steps, "agent stopped at the step limit, continuing");
    }
    let action = describe_turns(&outcome.conversation);
    carrier.advance(carry, &action)
}
