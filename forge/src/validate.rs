//! JSON Schema validation shared by tool arguments and structured engine output.

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde_json::Value;

/// A schema compiled once and reused for every instance it checks.
pub struct CompiledSchema {
    validator: Validator,
}

impl CompiledSchema {
    /// Compile a Draft 2020-12 schema.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .context("compile json schema")?;
        Ok(Self { validator })
    }

    /// Every violation of the schema, rendered as text. Empty when valid.
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect()
    }
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
pub fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = CompiledSchema::compile(schema)?;
    let messages = compiled.violations(instance);
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_conforming_instance() {
        validate_schema(&json!({ "path": "/src" }), &schema()).expect("valid");
    }

    #[test]
    fn reports_every_violation() {
        let compiled = CompiledSchema::compile(&schema()).expect("compile");
        let violations = compiled.violations(&json!({ "extra": 1 }));
        assert_eq!(violations.len(), 2, "{violations:?}");
    }

    #[test]
    fn wrong_type_is_one_violation() {
        let compiled = CompiledSchema::compile(&schema()).expect("compile");
        let violations = compiled.violations(&json!({ "path": 7 }));
        assert_eq!(violations.len(), 1, "{violations:?}");
    }

    #[test]
    fn invalid_instance_fails_with_summary() {
        let err = validate_schema(&json!({}), &schema()).unwrap_err();
        assert!(err.to_string().starts_with("schema validation failed"));
    }
}
