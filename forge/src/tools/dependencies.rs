//! Dependency tools. `package.json` is only ever changed through npm.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::io::config::NpmConfig;
use crate::io::process::run_command_with_timeout;
use crate::tools::files::PACKAGE_MANIFEST;
use crate::tools::{Tool, string_list_arg};

static PACKAGE_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*(?:@[A-Za-z0-9._^~<>=*+-]+)?$")
        .expect("valid package spec regex")
});

/// Reject anything that is not a plain npm package spec (`name`, `@scope/name`,
/// optionally `@version`), so model output cannot pass flags to npm.
pub fn validate_package_spec(spec: &str) -> Result<()> {
    if spec.len() > 214 || !PACKAGE_SPEC.is_match(spec) {
        bail!("'{spec}' is not a valid npm package name");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyAction {
    Install,
    InstallDev,
    Remove,
    RemoveDev,
}

impl DependencyAction {
    fn tool_name(self) -> &'static str {
        match self {
            DependencyAction::Install => "install_dependencies",
            DependencyAction::InstallDev => "install_dev_dependencies",
            DependencyAction::Remove => "remove_dependencies",
            DependencyAction::RemoveDev => "remove_dev_dependencies",
        }
    }

    fn description(self) -> &'static str {
        match self {
            DependencyAction::Install => "Install npm packages as runtime dependencies.",
            DependencyAction::InstallDev => "Install npm packages as development dependencies.",
            DependencyAction::Remove => "Uninstall npm runtime dependencies.",
            DependencyAction::RemoveDev => "Uninstall npm development dependencies.",
        }
    }

    fn npm_args(self) -> &'static [&'static str] {
        match self {
            DependencyAction::Install => &["install"],
            DependencyAction::InstallDev => &["install", "--save-dev"],
            DependencyAction::Remove => &["uninstall"],
            DependencyAction::RemoveDev => &["uninstall", "--save-dev"],
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            DependencyAction::Install | DependencyAction::InstallDev => "Installed",
            DependencyAction::Remove | DependencyAction::RemoveDev => "Removed",
        }
    }
}

/// Runs `npm install`/`npm uninstall` in the project root.
pub struct DependencyTool {
    action: DependencyAction,
    root: PathBuf,
    npm: NpmConfig,
}

impl DependencyTool {
    pub fn new(action: DependencyAction, root: impl Into<PathBuf>, npm: NpmConfig) -> Self {
        Self {
            action,
            root: root.into(),
            npm,
        }
    }

    fn command(&self, packages: &[String]) -> Command {
        let mut cmd = Command::new(&self.npm.program);
        cmd.args(self.action.npm_args())
            .args(packages)
            .current_dir(&self.root);
        cmd
    }
}

impl Tool for DependencyTool {
    fn name(&self) -> &str {
        self.action.tool_name()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "packages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Package names, optionally with a version, e.g. zod or react@18"
                }
            },
            "required": ["packages"]
        })
    }

    #[instrument(skip_all, fields(tool = self.action.tool_name()))]
    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let packages = string_list_arg(args, "packages")?;
        if packages.is_empty() {
            bail!("no packages given");
        }
        for spec in &packages {
            validate_package_spec(spec)?;
        }
        info!(packages = ?packages, "running npm");
        let output = run_command_with_timeout(
            self.command(&packages),
            self.npm.timeout(),
            self.npm.output_limit_bytes,
        )
        .context("run npm")?;
        if !output.success() {
            warn!(status = %output.describe_status(), "npm failed");
            bail!(
                "npm {} failed ({}):\n{}",
                self.action.npm_args()[0],
                output.describe_status(),
                output.combined_text("npm").trim()
            );
        }
        Ok(format!("{}: {}", self.action.past_tense(), packages.join(", ")))
    }
}

/// `list_dependencies`: dependencies and devDependencies from `package.json`.
pub struct ListDependencies {
    root: PathBuf,
}

impl ListDependencies {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ListDependencies {
    fn name(&self) -> &str {
        "list_dependencies"
    }

    fn description(&self) -> &str {
        "List the project's npm dependencies and devDependencies with their versions."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn invoke(&self, _args: &Map<String, Value>) -> Result<String> {
        let path = self.root.join(PACKAGE_MANIFEST);
        if !path.exists() {
            return Ok("No package.json in the project yet.".to_string());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let manifest: Value =
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        let mut sections = Vec::new();
        for key in ["dependencies", "devDependencies"] {
            let entries = manifest
                .get(key)
                .and_then(Value::as_object)
                .map(|deps| {
                    deps.iter()
                        .map(|(name, version)| {
                            format!("  {name} {}", version.as_str().unwrap_or("?"))
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            if entries.is_empty() {
                sections.push(format!("{key}: (none)"));
            } else {
                sections.push(format!("{key}:\n{}", entries.join("\n")));
            }
        }
        Ok(sections.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn package_spec_accepts_names_scopes_and_versions() {
        for spec in ["zod", "@tanstack/react-query", "react@18.3.1", "next@^15.0.0", "lodash.merge"] {
            validate_package_spec(spec).unwrap_or_else(|err| panic!("{spec}: {err}"));
        }
    }

    #[test]
    fn package_spec_rejects_flags_and_paths() {
        for spec in ["--global", "-g", "../evil", "zod; rm -rf /", "Zod", "", "git+https://x"] {
            assert!(validate_package_spec(spec).is_err(), "{spec} should be rejected");
        }
    }

    #[test]
    fn npm_arguments_follow_action() {
        let tool = DependencyTool::new(DependencyAction::RemoveDev, "/project", NpmConfig::default());
        let cmd = tool.command(&["eslint".to_string()]);
        let argv: Vec<_> = cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()).collect();
        assert_eq!(argv, vec!["uninstall", "--save-dev", "eslint"]);
        assert_eq!(tool.name(), "remove_dev_dependencies");
    }

    #[test]
    fn invalid_spec_never_reaches_npm() {
        let npm = NpmConfig {
            program: "definitely-not-a-real-npm-binary".to_string(),
            ..NpmConfig::default()
        };
        let tool = DependencyTool::new(DependencyAction::Install, "/project", npm);
        let err = tool
            .invoke(&args(json!({ "packages": ["--registry=http://evil"] })))
            .unwrap_err();
        assert!(err.to_string().contains("not a valid npm package name"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_npm_reports_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let npm = NpmConfig {
            program: "false".to_string(),
            ..NpmConfig::default()
        };
        let tool = DependencyTool::new(DependencyAction::Install, temp.path(), npm);
        let err = tool.invoke(&args(json!({ "packages": ["zod"] }))).unwrap_err();
        assert!(err.to_string().starts_with("npm install failed (exit code 1)"), "{err}");
    }

    #[test]
    fn list_dependencies_reads_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join(PACKAGE_MANIFEST),
            r#"{"dependencies":{"next":"15.0.0","react":"19.0.0"},"devDependencies":{}}"#,
        )
        .expect("manifest");
        let listing = ListDependencies::new(temp.path())
            .invoke(&Map::new())
            .expect("list");
        assert_eq!(
            listing,
            "dependencies:\n  next 15.0.0\n  react 19.0.0\ndevDependencies: (none)"
        );
    }

    #[test]
    fn list_dependencies_without_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let listing = ListDependencies::new(temp.path())
            .invoke(&Map::new())
            .expect("list");
        assert_eq!(listing, "No package.json in the project yet.");
    }
}
