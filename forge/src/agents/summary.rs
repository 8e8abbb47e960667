//! Compounding summary threaded between independent agent runs.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::message::Message;
use crate::core::summary::{TurnAction, clamp_summary};
use crate::io::engine::Engine;
use crate::io::prompt::PromptEngine;

/// Rewrites the carry after each task or heal attempt.
pub struct SummaryCarrier<'a, E: Engine + ?Sized> {
    engine: &'a E,
    prompts: &'a PromptEngine,
    max_sentences: usize,
    max_chars: usize,
}

impl<'a, E: Engine + ?Sized> SummaryCarrier<'a, E> {
    pub fn new(
        engine: &'a E,
        prompts: &'a PromptEngine,
        max_sentences: usize,
        max_chars: usize,
    ) -> Self {
        Self {
            engine,
            prompts,
            max_sentences,
            max_chars,
        }
    }

    /// Fold `action` into `previous` and return the replacement summary.
    ///
    /// An empty action returns `previous` unchanged without calling the engine.
    #[instrument(skip_all, fields(previous_chars = previous.len()))]
    pub fn advance(&self, previous: &str, action: &TurnAction) -> Result<String> {
        if action.is_empty() {
            return Ok(previous.to_string());
        }
        let messages = [
            Message::system(self.prompts.summary_system(self.max_sentences)?),
            Message::human(self.prompts.summary_request(previous, &action.describe())?),
        ];
        let reply = self
            .engine
            .infer(&messages, &[])
            .context("summarize progress")?;
        let summary = clamp_summary(&reply.content, self.max_sentences, self.max_chars);
        if summary.is_empty() {
            debug!("engine returned an empty summary, keeping the previous one");
            return Ok(clamp_summary(previous, self.max_sentences, self.max_chars));
        }
        debug!(chars = summary.len(), "summary advanced");
        Ok(summary)
    }
}
