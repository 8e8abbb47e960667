//! Web search client used by the `search_internet` tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::io::config::SearchConfig;

const MAX_ORGANIC_RESULTS: usize = 5;

/// Abstraction over web search backends.
pub trait SearchClient: Send + Sync {
    fn search(&self, query: &str) -> Result<String>;
}

/// Build the configured client: Serper when its API key is set.
pub fn search_client_from_config(config: &SearchConfig) -> Result<Arc<dyn SearchClient>> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(Arc::new(SerperSearch::new(config, key)?)),
        _ => Ok(Arc::new(UnconfiguredSearch {
            api_key_env: config.api_key_env.clone(),
        })),
    }
}

/// Google search through serper.dev.
pub struct SerperSearch {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl SerperSearch {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

impl SearchClient for SerperSearch {
    #[instrument(skip_all, fields(query_len = query.len()))]
    fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query }))
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("search API error ({status}): {}", body.trim()));
        }
        let results: SerperResponse = response.json().context("decode search response")?;
        debug!(organic = results.organic.len(), "search completed");
        Ok(condense(&results))
    }
}

/// Stand-in used when no API key is configured.
pub struct UnconfiguredSearch {
    pub api_key_env: String,
}

impl SearchClient for UnconfiguredSearch {
    fn search(&self, _query: &str) -> Result<String> {
        bail!(
            "web search is not configured; set {} to enable it",
            self.api_key_env
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    knowledge_graph: Option<KnowledgeGraph>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

fn condense(results: &SerperResponse) -> String {
    let mut lines = Vec::new();
    if let Some(answer) = &results.answer_box
        && let Some(text) = answer.answer.as_ref().or(answer.snippet.as_ref())
    {
        lines.push(format!("Answer: {text}"));
    }
    if let Some(graph) = &results.knowledge_graph
        && let (Some(title), Some(description)) = (&graph.title, &graph.description)
    {
        lines.push(format!("{title}: {description}"));
    }
    for result in results.organic.iter().take(MAX_ORGANIC_RESULTS) {
        lines.push(format!("- {} ({})\n  {}", result.title, result.link, result.snippet));
    }
    if lines.is_empty() {
        return "No results found.".to_string();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condense_prefers_answer_then_graph_then_organic() {
        let results: SerperResponse = serde_json::from_value(json!({
            "answerBox": { "snippet": "Use next/font." },
            "knowledgeGraph": { "title": "Next.js", "description": "React framework" },
            "organic": [
                { "title": "Fonts", "link": "https://nextjs.org/docs", "snippet": "Optimizing fonts" }
            ]
        }))
        .expect("parse");
        assert_eq!(
            condense(&results),
            "Answer: Use next/font.\nNext.js: React framework\n- Fonts (https://nextjs.org/docs)\n  Optimizing fonts"
        );
    }

    #[test]
    fn condense_caps_organic_results() {
        let organic: Vec<_> = (0..8)
            .map(|i| json!({ "title": format!("r{i}"), "link": "l", "snippet": "s" }))
            .collect();
        let results: SerperResponse =
            serde_json::from_value(json!({ "organic": organic })).expect("parse");
        assert_eq!(condense(&results).lines().filter(|l| l.starts_with("- ")).count(), 5);
    }

    #[test]
    fn empty_response_says_so() {
        assert_eq!(condense(&SerperResponse::default()), "No results found.");
    }

    #[test]
    fn unconfigured_search_names_the_variable() {
        let search = UnconfiguredSearch {
            api_key_env: "SERPER_API_KEY".to_string(),
        };
        let err = search.search("next.js").unwrap_err();
        assert!(err.to_string().contains("SERPER_API_KEY"));
    }
}
