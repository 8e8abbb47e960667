//! Task execution stage: one fresh conversation per planned task.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::agent_loop::AgentLoopConfig;
use crate::agents::run_and_summarize;
use crate::agents::summary::SummaryCarrier;
use crate::io::engine::Engine;
use crate::io::prompt::PromptEngine;
use crate::tools::ToolRegistry;

pub struct TaskExecutor<'a, E: Engine + ?Sized> {
    engine: &'a E,
    prompts: &'a PromptEngine,
    loop_config: &'a AgentLoopConfig,
    carrier: &'a SummaryCarrier<'a, E>,
}

impl<'a, E: Engine + ?Sized> TaskExecutor<'a, E> {
    pub fn new(
        engine: &'a E,
        prompts: &'a PromptEngine,
        loop_config: &'a AgentLoopConfig,
        carrier: &'a SummaryCarrier<'a, E>,
    ) -> Self {
        Self {
            engine,
            prompts,
            loop_config,
            carrier,
        }
    }

    /// Carry out `task` with `tools` and return the new carry.
    #[instrument(skip_all, fields(task = %task))]
    pub fn execute(&self, task: &str, carry: &str, tools: &ToolRegistry) -> Result<String> {
        info!("executing task");
        run_and_summarize(
            self.engine,
            self.prompts.task_system()?,
            task.to_string(),
            tools,
            self.loop_config,
            self.carrier,
            carry,
        )
        .with_context(|| format!("task '{task}'"))
    }
}
