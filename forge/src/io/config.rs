//! Forge configuration stored in `forge.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "forge.toml";

/// Forge configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that drive a local Ollama model against a Next.js project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    pub engine: EngineConfig,
    pub agent: AgentConfig,
    pub heal: HealConfig,
    pub build: BuildConfig,
    pub npm: NpmConfig,
    pub scaffold: ScaffoldConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the Ollama-compatible chat API.
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.0,
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on reasoning turns per agent loop.
    pub max_reasoning_steps: usize,
    pub summary_max_sentences: usize,
    /// Hard ceiling on the compounding summary length, in characters.
    pub summary_max_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_reasoning_steps: 25,
            summary_max_sentences: 3,
            summary_max_chars: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealConfig {
    /// Repair attempts before the project is reverted.
    pub max_attempts: u32,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Command whose success means the project builds.
    pub command: Vec<String>,
    /// Command exposed to the healer through the `run_lint` tool.
    pub lint_command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate build stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            lint_command: vec!["npm".to_string(), "run".to_string(), "lint".to_string()],
            timeout_secs: 15 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NpmConfig {
    pub program: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl NpmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScaffoldConfig {
    /// Template command; `{name}` is replaced by the project directory name.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Directories whose contents are never snapshotted or rewritten on revert.
    pub preserve_dirs: Vec<String>,
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            command: [
                "npx",
                "create-next-app@latest",
                "{name}",
                "--yes",
                "--tailwind",
                "--eslint",
                "--src-dir",
                "--app",
                "--ts",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            timeout_secs: 15 * 60,
            preserve_dirs: vec![".git".to_string(), "node_modules".to_string()],
        }
    }
}

impl ScaffoldConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    /// Environment variable holding the API key (never stored in the file).
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key_env: "SERPER_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.engine.base_url.trim().is_empty() {
            return Err(anyhow!("engine.base_url must be non-empty"));
        }
        if self.engine.model.trim().is_empty() {
            return Err(anyhow!("engine.model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.engine.temperature) {
            return Err(anyhow!("engine.temperature must be within 0.0..=2.0"));
        }
        if self.engine.request_timeout_secs == 0 {
            return Err(anyhow!("engine.request_timeout_secs must be > 0"));
        }
        if self.agent.max_reasoning_steps == 0 {
            return Err(anyhow!("agent.max_reasoning_steps must be > 0"));
        }
        if self.agent.summary_max_sentences == 0 {
            return Err(anyhow!("agent.summary_max_sentences must be > 0"));
        }
        if self.agent.summary_max_chars == 0 {
            return Err(anyhow!("agent.summary_max_chars must be > 0"));
        }
        validate_command("build.command", &self.build.command)?;
        validate_command("build.lint_command", &self.build.lint_command)?;
        validate_command("scaffold.command", &self.scaffold.command)?;
        if self.build.timeout_secs == 0 {
            return Err(anyhow!("build.timeout_secs must be > 0"));
        }
        if self.build.output_limit_bytes == 0 {
            return Err(anyhow!("build.output_limit_bytes must be > 0"));
        }
        if self.npm.program.trim().is_empty() {
            return Err(anyhow!("npm.program must be non-empty"));
        }
        if self.npm.timeout_secs == 0 {
            return Err(anyhow!("npm.timeout_secs must be > 0"));
        }
        if self.npm.output_limit_bytes == 0 {
            return Err(anyhow!("npm.output_limit_bytes must be > 0"));
        }
        if self.scaffold.timeout_secs == 0 {
            return Err(anyhow!("scaffold.timeout_secs must be > 0"));
        }
        if self.search.timeout_secs == 0 {
            return Err(anyhow!("search.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

fn validate_command(field: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{field} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        let mut cfg = ForgeConfig::default();
        cfg.heal.max_attempts = 5;
        cfg.engine.model = "qwen2.5-coder:7b".to_string();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(&path, "[heal]\nmax_attempts = 1\n").expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.heal.max_attempts, 1);
        assert_eq!(loaded.agent, AgentConfig::default());
    }

    #[test]
    fn rejects_empty_build_command() {
        let mut cfg = ForgeConfig::default();
        cfg.build.command = Vec::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("build.command"));
    }
}
