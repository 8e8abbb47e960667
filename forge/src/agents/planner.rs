//! Planner stage: requirement documents in, three-phase plan out.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{info, instrument};

use crate::agents::agent_loop::{AgentLoopConfig, run_agent_loop};
use crate::core::message::{Conversation, Message};
use crate::core::plan::{Plan, plan_schema};
use crate::io::engine::Engine;
use crate::io::prompt::PromptEngine;
use crate::io::requirements::RequirementTree;
use crate::tools::ToolRegistry;
use crate::validate::validate_schema;

pub struct Planner<'a, E: Engine + ?Sized> {
    engine: &'a E,
    prompts: &'a PromptEngine,
    loop_config: &'a AgentLoopConfig,
}

impl<'a, E: Engine + ?Sized> Planner<'a, E> {
    pub fn new(engine: &'a E, prompts: &'a PromptEngine, loop_config: &'a AgentLoopConfig) -> Self {
        Self {
            engine,
            prompts,
            loop_config,
        }
    }

    /// Build the planning conversation, let the engine research with `tools`,
    /// then extract the plan with one structured call.
    ///
    /// Fails when the engine cannot produce a schema-conformant plan.
    #[instrument(skip_all, fields(root = %tree.root().display()))]
    pub fn plan(&self, tree: &RequirementTree, tools: &ToolRegistry) -> Result<Plan> {
        let mut conversation = Conversation::new(self.prompts.planner_system()?);
        let mut documents = 0usize;
        for doc in tree.iter() {
            let doc = doc?;
            conversation.push(Message::human(doc.to_prompt()));
            documents += 1;
        }
        info!(documents, "planning");

        let outcome = run_agent_loop(self.engine, conversation, tools, self.loop_config)
            .context("planning loop")?;

        let mut messages = outcome.conversation.into_messages();
        messages.push(Message::human(self.prompts.plan_extraction()?));
        let schema = plan_schema();
        let raw = self
            .engine
            .infer_structured(&messages, &schema)
            .context("extract plan")?;
        let plan = plan_from_value(raw)?;
        info!(
            common = plan.common_tasks.len(),
            backend = plan.backend_tasks.len(),
            frontend = plan.frontend_tasks.len(),
            reasoning_steps = outcome.reasoning_steps,
            "plan extracted"
        );
        Ok(plan)
    }
}

/// Validate and normalize structured planner output.
pub fn plan_from_value(raw: Value) -> Result<Plan> {
    validate_schema(&raw, &plan_schema()).context("plan output does not match schema")?;
    let plan: Plan = serde_json::from_value(raw).context("deserialize plan")?;
    plan.normalized()
        .map_err(|err| anyhow!("plan output is invalid: {err}"))
}
