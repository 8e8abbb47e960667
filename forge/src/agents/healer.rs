//! Self-heal stage: repair a failing build from its diagnostic.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::agent_loop::AgentLoopConfig;
use crate::agents::run_and_summarize;
use crate::agents::summary::SummaryCarrier;
use crate::io::engine::Engine;
use crate::io::prompt::PromptEngine;
use crate::tools::ToolRegistry;

pub struct Healer<'a, E: Engine + ?Sized> {
    engine: &'a E,
    prompts: &'a PromptEngine,
    loop_config: &'a AgentLoopConfig,
    carrier: &'a SummaryCarrier<'a, E>,
}

impl<'a, E: Engine + ?Sized> Healer<'a, E> {
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

    /// One repair attempt seeded with the build output and the carry.
    #[instrument(skip_all, fields(diagnostic_bytes = diagnostic.len()))]
    pub fn heal(&self, diagnostic: &str, carry: &str, tools: &ToolRegistry) -> Result<String> {
        info!("attempting build repair");
        run_and_summarize(
            self.engine,
            self.prompts.healer_system()?,
            self.prompts.heal_seed(diagnostic, carry)?,
            tools,
            self.loop_config,
            self.carrier,
            carry,
        )
        .context("heal attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedEngine, ScriptedReply};

    #[test]
    fn seed_is_diagnostic_followed_by_carry() {
        let engine = ScriptedEngine::new(vec![
            ScriptedReply::text("The import path was wrong; nothing else to change."),
            ScriptedReply::text("Diagnosed a bad import."),
        ]);
        let prompts = PromptEngine::new().expect("prompts");
        let config = AgentLoopConfig::default();
        let carrier = SummaryCarrier::new(&engine, &prompts, 3, 1200);

        let carry = Healer::new(&engine, &prompts, &config, &carrier)
            .heal("Module not found: ./Header", "Built the layout.", &ToolRegistry::new())
            .expect("heal");
        assert_eq!(carry, "Diagnosed a bad import.");

        let calls = engine.calls();
        assert_eq!(calls[0].messages[0].content, prompts.healer_system().expect("prompt"));
        assert_eq!(
            calls[0].messages[1].content,
            "Module not found: ./Header\n\nSummary of work so far:\nBuilt the layout."
        );
    }
}
