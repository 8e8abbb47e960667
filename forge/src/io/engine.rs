//! Reasoning engine abstraction.
//!
//! The [`Engine`] trait decouples the agent loop from the model backend
//! (currently an Ollama-compatible `/api/chat` endpoint). Tests use scripted
//! engines that return queued turns without any network access.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::core::message::{Message, Role, ToolInvocation};
use crate::io::config::EngineConfig;
use crate::tools::ToolSchema;

/// Abstraction over reasoning backends.
pub trait Engine: Send + Sync {
    /// Produce the next assistant turn. The engine may request any of `tools`.
    fn infer(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message>;

    /// Produce a JSON value constrained by `schema`.
    ///
    /// Implementations return whatever the backend produced; callers validate it.
    fn infer_structured(&self, messages: &[Message], schema: &Value) -> Result<Value>;

    /// Short description for status reporting, e.g. `ollama:llama3.1:8b`.
    fn label(&self) -> String;
}

/// Engine backed by Ollama's chat API.
pub struct OllamaEngine {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    temperature: f64,
    next_call_id: AtomicU64,
}

impl OllamaEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            next_call_id: AtomicU64::new(1),
        })
    }

    fn chat(&self, request: &ChatRequest<'_>) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("ollama API error ({status}): {}", body.trim()));
        }
        response.json().context("decode ollama chat response")
    }

    fn next_id(&self) -> String {
        format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Engine for OllamaEngine {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len(), tools = tools.len()))]
    fn infer(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire_messages(messages),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
            tools: tools.iter().map(WireTool::from).collect(),
            format: None,
        };
        let response = self.chat(&request)?;
        let invocations = response
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolInvocation::new(self.next_id(), call.function.name, call.function.arguments))
            .collect::<Vec<_>>();
        debug!(invocations = invocations.len(), "assistant turn received");
        Ok(Message::assistant(response.message.content, invocations))
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn infer_structured(&self, messages: &[Message], schema: &Value) -> Result<Value> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire_messages(messages),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
            tools: Vec::new(),
            format: Some(schema),
        };
        let response = self.chat(&request)?;
        parse_structured(&response.message.content)
    }

    fn label(&self) -> String {
        format!("ollama:{}", self.model)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    options: ChatOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSchema> for WireTool<'a> {
    fn from(schema: &'a ToolSchema) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &schema.name,
                description: &schema.description,
                parameters: &schema.parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireToolCall {
    function: WireCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

/// Convert the conversation into Ollama's message shape.
///
/// Ollama correlates tool replies by tool name, so each reply carries the
/// name of the invocation it answers.
fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut names_by_id: Map<String, Value> = Map::new();
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        let role = match message.role {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_calls = message
            .invocations
            .iter()
            .map(|invocation| {
                names_by_id.insert(invocation.id.clone(), Value::String(invocation.name.clone()));
                WireToolCall {
                    function: WireCall {
                        name: invocation.name.clone(),
                        arguments: Value::Object(invocation.arguments.clone()),
                    },
                }
            })
            .collect();
        let tool_name = message
            .answers
            .as_ref()
            .and_then(|id| names_by_id.get(id))
            .and_then(Value::as_str)
            .map(str::to_string);
        wire.push(WireMessage {
            role,
            content: message.content.clone(),
            tool_calls,
            tool_name,
        });
    }
    wire
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// Parse structured output, tolerating a surrounding markdown code fence.
pub fn parse_structured(content: &str) -> Result<Value> {
    let body = match CODE_FENCE.captures(content) {
        Some(captures) => captures.get(1).map_or("", |m| m.as_str()),
        None => content,
    };
    serde_json::from_str(body.trim()).map_err(|err| {
        warn!(err = %err, "structured output is not valid JSON");
        anyhow!("structured output is not valid JSON: {err}")
    })
}
