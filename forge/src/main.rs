//! Requirement-driven web project generator CLI.
//!
//! Reads a tree of `index.txt` requirement documents from a project
//! directory, scaffolds the project, plans it, generates it task by task and
//! verifies that it builds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use forge::exit_codes;
use forge::generate::{
    CancelledError, UnrecoverableBuildError, generator_from_config, run_with_config,
};
use forge::io::config::{DEFAULT_CONFIG_FILE, ForgeConfig, load_config, write_config};
use forge::io::engine::OllamaEngine;
use forge::state::{CancelFlag, SharedProjectState};

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Generate a web project from a tree of requirement documents"
)]
struct Cli {
    /// Config file; missing files fall back to defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold, plan, generate and verify a project.
    Generate {
        /// Project directory holding `index.txt`.
        #[arg(short, long)]
        project: PathBuf,
    },
    /// Print the plan for an already scaffolded project without changing it.
    Plan {
        #[arg(short, long)]
        project: PathBuf,
    },
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    forge::logging::init();
    // Usage errors map to INVALID; clap's own code 2 would read as REVERTED.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            std::process::exit(code);
        }
    };
    let code = match run(cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UnrecoverableBuildError>().is_some() {
        exit_codes::REVERTED
    } else if err.downcast_ref::<CancelledError>().is_some() {
        exit_codes::CANCELLED
    } else {
        exit_codes::INVALID
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate { project } => cmd_generate(&cli.config, &project),
        Command::Plan { project } => cmd_plan(&cli.config, &project),
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn project_dir(project: &Path) -> Result<PathBuf> {
    project
        .canonicalize()
        .with_context(|| format!("project directory {}", project.display()))
}

fn cmd_generate(config_path: &Path, project: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let project = project_dir(project)?;
    let engine = Arc::new(OllamaEngine::new(&config.engine)?);

    let state = SharedProjectState::new(engine);
    let mut lease = state.try_begin()?;
    lease.set_project_path(&project);
    let outcome = run_with_config(&lease, &config, CancelFlag::new(), |event| {
        println!("{event}");
    })?;

    println!(
        "done: {} tasks executed, {} heal attempts",
        outcome.tasks_executed, outcome.heal_attempts
    );
    if !outcome.summary.is_empty() {
        println!("summary: {}", outcome.summary);
    }
    Ok(())
}

fn cmd_plan(config_path: &Path, project: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let project = project_dir(project)?;
    let engine = Arc::new(OllamaEngine::new(&config.engine)?);
    let plan = generator_from_config(engine, &config)?.plan(&project)?;
    let payload = serde_json::to_string_pretty(&plan).context("serialize plan")?;
    println!("{payload}");
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &ForgeConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}
