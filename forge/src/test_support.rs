//! Test-only doubles for the engine, tools, scaffolder and build verifier.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value, json};
use walkdir::WalkDir;

use crate::core::message::{Message, Role, ToolInvocation};
use crate::io::build::{BuildOutcome, BuildVerifier};
use crate::io::engine::Engine;
use crate::io::requirements::REQUIREMENTS_DIR;
use crate::io::scaffold::{Scaffolder, relocate_requirements};
use crate::tools::toolbox::ToolProvider;
use crate::tools::{Tool, ToolRegistry, ToolSchema};

/// Shared, ordered record of side effects observed by the doubles.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tool that records `name {args}` and answers `ok`, or fails with a fixed error.
pub struct RecordingTool {
    name: String,
    log: CallLog,
    failure: Option<String>,
}

impl RecordingTool {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            failure: None,
        }
    }

    pub fn failing(name: &str, log: CallLog, error: &str) -> Self {
        Self {
            failure: Some(error.to_string()),
            ..Self::new(name, log)
        }
    }
}

impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "records its invocations"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let args = serde_json::to_string(args)?;
        self.log.push(format!("{} {args}", self.name));
        match &self.failure {
            Some(error) => Err(anyhow!("{error}")),
            None => Ok("ok".to_string()),
        }
    }
}

/// One canned engine answer.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Turn(Message),
    Structured(Value),
    Fail(String),
}

impl ScriptedReply {
    pub fn text(content: &str) -> Self {
        Self::Turn(Message::assistant(content, Vec::new()))
    }

    pub fn calls(calls: Vec<(&str, Value)>) -> Self {
        let invocations = calls
            .into_iter()
            .enumerate()
            .map(|(idx, (name, args))| ToolInvocation::new(format!("call_{idx}"), name, args))
            .collect();
        Self::Turn(Message::assistant("", invocations))
    }
}

/// What the engine was asked.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub messages: Vec<Message>,
    /// Names of the tools offered on this call.
    pub tools: Vec<String>,
    pub structured: bool,
}

impl EngineCall {
    pub fn system(&self) -> &str {
        self.messages
            .first()
            .filter(|message| message.role == Role::System)
            .map_or("", |message| message.content.as_str())
    }
}

type ReplyFn = dyn Fn(&EngineCall) -> ScriptedReply + Send + Sync;

enum Script {
    Queue(Mutex<VecDeque<ScriptedReply>>),
    Routed(Box<ReplyFn>),
}

/// Engine double answering from a queue or a routing closure.
pub struct ScriptedEngine {
    label: String,
    script: Script,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self::labelled("scripted", replies)
    }

    pub fn labelled(label: &str, replies: Vec<ScriptedReply>) -> Self {
        Self {
            label: label.to_string(),
            script: Script::Queue(Mutex::new(replies.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Decide every reply from the call itself; useful when stages interleave.
    pub fn from_fn(route: impl Fn(&EngineCall) -> ScriptedReply + Send + Sync + 'static) -> Self {
        Self {
            label: "scripted".to_string(),
            script: Script::Routed(Box::new(route)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next(&self, call: EngineCall) -> Result<ScriptedReply> {
        let reply = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front()
                .ok_or_else(|| anyhow!("scripted engine has no replies left"))?,
            Script::Routed(route) => route(&call),
        };
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
        Ok(reply)
    }
}

impl Engine for ScriptedEngine {
    fn infer(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<Message> {
        let call = EngineCall {
            messages: messages.to_vec(),
            tools: tools.iter().map(|tool| tool.name.clone()).collect(),
            structured: false,
        };
        match self.next(call)? {
            ScriptedReply::Turn(message) => Ok(message),
            ScriptedReply::Structured(_) => bail!("scripted structured reply to a chat call"),
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
        }
    }

    fn infer_structured(&self, messages: &[Message], _schema: &Value) -> Result<Value> {
        let call = EngineCall {
            messages: messages.to_vec(),
            tools: Vec::new(),
            structured: true,
        };
        match self.next(call)? {
            ScriptedReply::Structured(value) => Ok(value),
            ScriptedReply::Turn(_) => bail!("scripted chat reply to a structured call"),
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Build verifier replaying outcomes; the last one repeats forever.
pub struct ScriptedBuildVerifier {
    outcomes: Mutex<VecDeque<BuildOutcome>>,
    last: BuildOutcome,
    log: CallLog,
}

impl ScriptedBuildVerifier {
    pub fn new(outcomes: Vec<BuildOutcome>, log: CallLog) -> Self {
        let last = outcomes.last().cloned().unwrap_or(BuildOutcome::Passed);
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last,
            log,
        }
    }

    pub fn passing(log: CallLog) -> Self {
        Self::new(vec![BuildOutcome::Passed], log)
    }

    pub fn always_failing(diagnostic: &str, log: CallLog) -> Self {
        Self::new(
            vec![BuildOutcome::Failed {
                diagnostic: diagnostic.to_string(),
            }],
            log,
        )
    }
}

impl BuildVerifier for ScriptedBuildVerifier {
    fn verify(&self, _workdir: &Path) -> Result<BuildOutcome> {
        self.log.push("verify");
        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| self.last.clone()))
    }
}

/// The same recording tools for every stage.
pub struct StaticToolProvider {
    names: Vec<String>,
    log: CallLog,
}

impl StaticToolProvider {
    pub fn new(names: &[&str], log: CallLog) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            log,
        }
    }

    fn registry(&self) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for name in &self.names {
            registry.register(Box::new(RecordingTool::new(name, self.log.clone())))?;
        }
        Ok(registry)
    }
}

impl ToolProvider for StaticToolProvider {
    fn planner_tools(&self, _project: &Path) -> Result<ToolRegistry> {
        self.registry()
    }

    fn task_tools(&self, _project: &Path) -> Result<ToolRegistry> {
        self.registry()
    }

    fn healer_tools(&self, _project: &Path) -> Result<ToolRegistry> {
        self.registry()
    }
}

/// Scaffolder that relocates requirements and drops a `package.json`,
/// without running any external generator.
pub struct MarkerScaffolder {
    log: CallLog,
    failure: Option<String>,
}

impl MarkerScaffolder {
    pub fn new(log: CallLog) -> Self {
        Self { log, failure: None }
    }

    /// Moves the requirements like a real scaffold, then fails.
    pub fn failing(log: CallLog, error: &str) -> Self {
        Self {
            log,
            failure: Some(error.to_string()),
        }
    }
}

impl Scaffolder for MarkerScaffolder {
    fn scaffold(&self, project: &Path) -> Result<()> {
        self.log.push("scaffold");
        relocate_requirements(project)?;
        if let Some(error) = &self.failure {
            bail!("{error}");
        }
        fs::write(project.join("package.json"), "{\"name\":\"fixture\"}\n")?;
        Ok(())
    }
}

/// Temporary project directory seeded with requirement documents.
pub struct FixtureProject {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl FixtureProject {
    /// `docs` are `(relative path, contents)` pairs written under the project root.
    pub fn new(docs: &[(&str, &str)]) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("site");
        fs::create_dir_all(&root)?;
        for (rel, contents) in docs {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)?;
        }
        Ok(Self { _temp: temp, root })
    }

    /// A project that already went through scaffolding.
    pub fn scaffolded(docs: &[(&str, &str)]) -> Result<Self> {
        let fixture = Self::new(docs)?;
        relocate_requirements(&fixture.root)?;
        fs::write(fixture.root.join("package.json"), "{\"name\":\"fixture\"}\n")?;
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn is_scaffolded(&self) -> bool {
        self.root.join(REQUIREMENTS_DIR).is_dir()
    }

    /// Sorted `(relative path, file contents)` pairs; directories have `None`.
    pub fn listing(&self) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let rel = entry.path().strip_prefix(&self.root)?.display().to_string();
            if entry.file_type().is_dir() {
                out.push((rel, None));
            } else {
                out.push((rel, Some(fs::read(entry.path())?)));
            }
        }
        Ok(out)
    }
}
