//! Build verification adapter (`npm run build` by default).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::io::config::BuildConfig;
use crate::io::process::run_command_with_timeout;

/// Result of one build verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Passed,
    /// The build ran and failed; `diagnostic` is its captured output.
    Failed { diagnostic: String },
}

impl BuildOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, BuildOutcome::Passed)
    }
}

/// Checks whether a project builds.
///
/// `Err` is reserved for infrastructure failures (the command cannot be
/// spawned); a failing build is an `Ok(BuildOutcome::Failed { .. })`.
pub trait BuildVerifier: Send + Sync {
    fn verify(&self, workdir: &Path) -> Result<BuildOutcome>;
}

/// Runs a build command with a timeout and bounded output capture.
pub struct CommandBuildVerifier {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBuildVerifier {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl BuildVerifier for CommandBuildVerifier {
    #[instrument(skip_all, fields(workdir = %workdir.display()))]
    fn verify(&self, workdir: &Path) -> Result<BuildOutcome> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("build command is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(workdir);
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run build command {}", self.command.join(" ")))?;

        if output.success() {
            info!("build passed");
            return Ok(BuildOutcome::Passed);
        }
        warn!(status = %output.describe_status(), "build failed");
        let mut diagnostic = output.combined_text("build");
        if output.timed_out {
            diagnostic.push_str(&format!(
                "\n[build timed out after {}s]",
                self.timeout.as_secs()
            ));
        }
        if diagnostic.trim().is_empty() {
            diagnostic = format!("build failed with {} and no output", output.describe_status());
        }
        Ok(BuildOutcome::Failed { diagnostic })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn verifier(script: &str, timeout_secs: u64) -> CommandBuildVerifier {
        CommandBuildVerifier::new(&BuildConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
            ..BuildConfig::default()
        })
    }

    #[test]
    fn passing_command_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = verifier("exit 0", 10).verify(temp.path()).expect("verify");
        assert_eq!(outcome, BuildOutcome::Passed);
    }

    #[test]
    fn failing_command_carries_its_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = verifier("echo 'Type error: bad prop' 1>&2; exit 1", 10)
            .verify(temp.path())
            .expect("verify");
        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                diagnostic: "Type error: bad prop\n".to_string()
            }
        );
    }

    #[test]
    fn silent_failure_still_has_a_diagnostic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = verifier("exit 2", 10).verify(temp.path()).expect("verify");
        assert_eq!(
            outcome,
            BuildOutcome::Failed {
                diagnostic: "build failed with exit code 2 and no output".to_string()
            }
        );
    }

    #[test]
    fn build_runs_in_the_project_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker"), "").expect("marker");
        let outcome = verifier("test -f marker", 10).verify(temp.path()).expect("verify");
        assert!(outcome.passed());
    }

    #[test]
    fn missing_program_is_an_infrastructure_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let verifier = CommandBuildVerifier::new(&BuildConfig {
            command: vec!["definitely-not-a-build-tool".to_string()],
            ..BuildConfig::default()
        });
        assert!(verifier.verify(temp.path()).is_err());
    }
}
