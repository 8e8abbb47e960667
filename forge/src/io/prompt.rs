//! Prompt templates for every agent role.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const PLAN_EXTRACTION_TEMPLATE: &str = include_str!("prompts/plan_extraction.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const HEALER_TEMPLATE: &str = include_str!("prompts/healer.md");
const SUMMARY_TEMPLATE: &str = include_str!("prompts/summary.md");
const SUMMARY_REQUEST_TEMPLATE: &str = include_str!("prompts/summary_request.md");
const HEAL_SEED_TEMPLATE: &str =
    "{{ diagnostic }}{% if carry %}\n\nSummary of work so far:\n{{ carry }}{% endif %}";

/// Template engine wrapper around minijinja. Templates are compiled once.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("planner", PLANNER_TEMPLATE),
            ("plan_extraction", PLAN_EXTRACTION_TEMPLATE),
            ("task", TASK_TEMPLATE),
            ("healer", HEALER_TEMPLATE),
            ("summary", SUMMARY_TEMPLATE),
            ("summary_request", SUMMARY_REQUEST_TEMPLATE),
            ("heal_seed", HEAL_SEED_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("compile {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn planner_system(&self) -> Result<String> {
        self.render("planner", context! {})
    }

    pub fn plan_extraction(&self) -> Result<String> {
        self.render("plan_extraction", context! {})
    }

    pub fn task_system(&self) -> Result<String> {
        self.render("task", context! {})
    }

    pub fn healer_system(&self) -> Result<String> {
        self.render("healer", context! {})
    }

    /// First human message of a heal attempt: the build failure, then the carry.
    pub fn heal_seed(&self, diagnostic: &str, carry: &str) -> Result<String> {
        self.render(
            "heal_seed",
            context! {
                diagnostic => diagnostic.trim_end(),
                carry => Some(carry.trim()).filter(|c| !c.is_empty()),
            },
        )
    }

    pub fn summary_system(&self, max_sentences: usize) -> Result<String> {
        self.render("summary", context! { max_sentences => max_sentences })
    }

    pub fn summary_request(&self, previous: &str, action: &str) -> Result<String> {
        self.render(
            "summary_request",
            context! {
                previous => Some(previous.trim()).filter(|p| !p.is_empty()),
                action => action.trim(),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} template"))
    }
}
