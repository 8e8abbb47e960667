//! Project scaffolding: move requirement documents aside and generate the app skeleton.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, instrument, warn};

use crate::io::config::ScaffoldConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::requirements::{REQUIREMENT_FILE, REQUIREMENTS_DIR};

const SCAFFOLD_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Turns a directory of requirement documents into a buildable project.
pub trait Scaffolder: Send + Sync {
    /// A scaffolded project carries the requirements marker directory.
    fn is_scaffolded(&self, project: &Path) -> bool {
        project.join(REQUIREMENTS_DIR).is_dir()
    }

    fn scaffold(&self, project: &Path) -> Result<()>;
}

/// Move the requirement tree into `<project>/prompts/`.
///
/// The root `index.txt` and every non-hidden top-level directory holding an
/// `index.txt` are moved. Fails before touching anything when the root
/// document is missing.
pub fn relocate_requirements(project: &Path) -> Result<usize> {
    let root_doc = project.join(REQUIREMENT_FILE);
    if !root_doc.is_file() {
        bail!("missing root requirement document {}", root_doc.display());
    }
    let prompts_dir = project.join(REQUIREMENTS_DIR);
    fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create {}", prompts_dir.display()))?;
    fs::rename(&root_doc, prompts_dir.join(REQUIREMENT_FILE))
        .with_context(|| format!("move {}", root_doc.display()))?;

    let mut moved = 1usize;
    let mut entries = fs::read_dir(project)
        .with_context(|| format!("read directory {}", project.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read directory {}", project.display()))?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') || name_str == REQUIREMENTS_DIR {
            continue;
        }
        let path = entry.path();
        if !path.is_dir() || !path.join(REQUIREMENT_FILE).is_file() {
            continue;
        }
        fs::rename(&path, prompts_dir.join(&name))
            .with_context(|| format!("move {}", path.display()))?;
        moved += 1;
    }
    Ok(moved)
}

/// Runs a project generator (create-next-app by default) and hoists its output.
pub struct CommandScaffolder {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandScaffolder {
    pub fn new(config: &ScaffoldConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: config.timeout(),
        }
    }

    fn command_for(&self, name: &str) -> Result<Command> {
        let argv: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace("{name}", name))
            .collect();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("scaffold command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).env("CI", "1");
        Ok(cmd)
    }
}

impl Scaffolder for CommandScaffolder {
    #[instrument(skip_all, fields(project = %project.display()))]
    fn scaffold(&self, project: &Path) -> Result<()> {
        let name = project
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("project path {} has no directory name", project.display()))?;

        let moved = relocate_requirements(project)?;
        info!(documents = moved, "requirement tree moved into prompts/");

        let mut cmd = self.command_for(&name)?;
        cmd.current_dir(project);
        let output = run_command_with_timeout(cmd, self.timeout, SCAFFOLD_OUTPUT_LIMIT_BYTES)
            .context("run scaffold command")?;
        if !output.success() {
            warn!(status = %output.describe_status(), "scaffold command failed");
            bail!(
                "project creation failed ({}):\n{}",
                output.describe_status(),
                output.combined_text("scaffold").trim()
            );
        }

        let generated = project.join(&name);
        hoist_contents(&generated, project)?;
        info!("project scaffolded");
        Ok(())
    }
}

/// Move every entry of `from` into `to`, then remove `from`.
fn hoist_contents(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        bail!("scaffold did not create {}", from.display());
    }
    for entry in fs::read_dir(from).with_context(|| format!("read directory {}", from.display()))? {
        let entry = entry.with_context(|| format!("read directory {}", from.display()))?;
        let target = to.join(entry.file_name());
        if target.exists() {
            bail!(
                "cannot hoist {}: {} already exists",
                entry.path().display(),
                target.display()
            );
        }
        fs::rename(entry.path(), &target)
            .with_context(|| format!("move {} to {}", entry.path().display(), target.display()))?;
    }
    fs::remove_dir(from).with_context(|| format!("remove {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn relocate_moves_documents_and_requirement_dirs_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(root, "index.txt", "site");
        write(root, "about/index.txt", "about");
        write(root, "assets/logo.svg", "<svg/>");
        write(root, ".hidden/index.txt", "secret");

        let moved = relocate_requirements(root).expect("relocate");
        assert_eq!(moved, 2);
        assert!(root.join("prompts/index.txt").is_file());
        assert!(root.join("prompts/about/index.txt").is_file());
        assert!(root.join("assets/logo.svg").is_file());
        assert!(root.join(".hidden/index.txt").is_file());
        assert!(!root.join("index.txt").exists());
    }

    #[test]
    fn relocate_without_root_document_changes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "about/index.txt", "about");
        assert!(relocate_requirements(temp.path()).is_err());
        assert!(!temp.path().join("prompts").exists());
        assert!(temp.path().join("about/index.txt").is_file());
    }

    #[test]
    fn default_scaffolder_detects_marker_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scaffolder = CommandScaffolder::new(&ScaffoldConfig::default());
        assert!(!scaffolder.is_scaffolded(temp.path()));
        fs::create_dir_all(temp.path().join(REQUIREMENTS_DIR)).expect("mkdir");
        assert!(scaffolder.is_scaffolded(temp.path()));
    }

    #[test]
    fn command_substitutes_project_name() {
        let scaffolder = CommandScaffolder::new(&ScaffoldConfig::default());
        let cmd = scaffolder.command_for("bakery").expect("command");
        let argv: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(argv[0], "create-next-app@latest");
        assert_eq!(argv[1], "bakery");
    }

    #[cfg(unix)]
    #[test]
    fn scaffold_runs_generator_and_hoists_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("bakery");
        write(&project, "index.txt", "site");
        let config = ScaffoldConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "mkdir -p {name}/src/app && echo '{}' > {name}/package.json && echo $CI > {name}/ci".to_string(),
            ],
            ..ScaffoldConfig::default()
        };
        CommandScaffolder::new(&config)
            .scaffold(&project)
            .expect("scaffold");
        assert!(project.join("package.json").is_file());
        assert!(project.join("src/app").is_dir());
        assert_eq!(fs::read_to_string(project.join("ci")).expect("ci"), "1\n");
        assert!(!project.join("bakery").exists());
        assert!(project.join("prompts/index.txt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn failing_generator_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("bakery");
        write(&project, "index.txt", "site");
        let config = ScaffoldConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "echo 'no network' >&2; exit 1".to_string()],
            ..ScaffoldConfig::default()
        };
        let err = CommandScaffolder::new(&config).scaffold(&project).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("project creation failed (exit code 1)"), "{text}");
        assert!(text.contains("no network"));
    }
}
