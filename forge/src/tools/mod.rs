//! Tools the reasoning engine may invoke, and the registry that dispatches them.
//!
//! Every tool returns a string. Failures are returned as `Err` from
//! [`Tool::invoke`]; the agent loop turns them into text for the engine, so no
//! tool failure ever escapes a loop.

pub mod dependencies;
pub mod files;
pub mod lint;
pub mod search;
pub mod toolbox;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::validate::CompiledSchema;

/// A capability the engine can request by name.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument object.
    fn parameters(&self) -> Value;
    fn invoke(&self, args: &Map<String, Value>) -> Result<String>;
}

/// Advertised shape of a tool, as sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

struct Registered {
    tool: Box<dyn Tool>,
    schema: ToolSchema,
    validator: CompiledSchema,
}

/// Name-unique, ordered set of tools bound to one agent loop.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Registered>,
}

/// Result of looking up and running a tool.
#[derive(Debug)]
pub enum Dispatch {
    NotFound,
    Rejected(Vec<String>),
    Completed(Result<String>),
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique within a registry.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            bail!("tool name must be non-empty");
        }
        if self.get(&name).is_some() {
            bail!("tool '{name}' is already registered");
        }
        let parameters = tool.parameters();
        let validator = CompiledSchema::compile(&parameters)
            .map_err(|err| anyhow!("tool '{name}' has an invalid parameter schema: {err:#}"))?;
        let schema = ToolSchema {
            name,
            description: tool.description().to_string(),
            parameters,
        };
        self.tools.push(Registered {
            tool,
            schema,
            validator,
        });
        Ok(())
    }

    /// Builder-style [`ToolRegistry::register`].
    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self> {
        self.register(Box::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.find(name).map(|entry| entry.tool.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|entry| entry.schema.name.as_str())
            .collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|entry| entry.schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name`, validate `args` against its schema and run it.
    pub fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Dispatch {
        let Some(entry) = self.find(name) else {
            return Dispatch::NotFound;
        };
        let violations = entry.validator.violations(&Value::Object(args.clone()));
        if !violations.is_empty() {
            return Dispatch::Rejected(violations);
        }
        Dispatch::Completed(entry.tool.invoke(args))
    }

    fn find(&self, name: &str) -> Option<&Registered> {
        self.tools.iter().find(|entry| entry.schema.name == name)
    }
}

/// Required string argument.
pub(crate) fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string argument '{key}'"))
}

/// Required array-of-strings argument.
pub(crate) fn string_list_arg(args: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    let items = args
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing array argument '{key}'"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("argument '{key}' must contain only strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument."
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
            Ok(string_arg(args, "text")?.to_string())
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo)).expect("first");
        let err = registry.register(Box::new(Echo)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn dispatch_runs_valid_invocations() {
        let registry = ToolRegistry::new().with(Echo).expect("registry");
        match registry.dispatch("echo", &args(json!({ "text": "hi" }))) {
            Dispatch::Completed(Ok(text)) => assert_eq!(text, "hi"),
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[test]
    fn dispatch_reports_unknown_and_invalid() {
        let registry = ToolRegistry::new().with(Echo).expect("registry");
        assert!(matches!(
            registry.dispatch("nope", &Map::new()),
            Dispatch::NotFound
        ));
        assert!(matches!(
            registry.dispatch("echo", &args(json!({ "text": 3 }))),
            Dispatch::Rejected(_)
        ));
    }

    #[test]
    fn schemas_preserve_registration_order() {
        let registry = ToolRegistry::new().with(Echo).expect("registry");
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
        assert_eq!(schemas[0].description, "Echo the text argument.");
    }

    #[test]
    fn string_list_arg_requires_strings() {
        let ok = string_list_arg(&args(json!({ "names": ["a", "b"] })), "names").expect("list");
        assert_eq!(ok, vec!["a", "b"]);
        let err = string_list_arg(&args(json!({ "names": ["a", 1] })), "names").unwrap_err();
        assert!(err.to_string().contains("only strings"));
    }
}
