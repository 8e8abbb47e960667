use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::io::config::BuildConfig;
use crate::io::process::run_command_with_timeout;
use crate::tools::Tool;

/// `run_lint`: run the configured lint command and report its output.
///
/// A failing lint is a successful invocation; the findings are the result.
pub struct RunLint {
    root: PathBuf,
    build: BuildConfig,
}

impl RunLint {
    pub fn new(root: impl Into<PathBuf>, build: BuildConfig) -> Self {
        Self {
            root: root.into(),
            build,
        }
    }
}

impl Tool for RunLint {
    fn name(&self) -> &str {
        "run_lint"
    }

    fn description(&self) -> &str {
        "Run the project's linter and return its findings."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    #[instrument(skip_all)]
    fn invoke(&self, _args: &Map<String, Value>) -> Result<String> {
        let Some((program, rest)) = self.build.lint_command.split_first() else {
            bail!("no lint command configured");
        };
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(&self.root);
        let output =
            run_command_with_timeout(cmd, self.build.timeout(), self.build.output_limit_bytes)
                .context("run lint")?;
        let text = output.combined_text("lint");
        if output.success() {
            Ok(format!("Lint passed.\n{}", text.trim()).trim_end().to_string())
        } else {
            Ok(format!(
                "Lint failed ({}):\n{}",
                output.describe_status(),
                text.trim()
            ))
        }
    }
}
