//! Generation pipeline: scaffold, plan, execute phases, verify and heal.
//!
//! `Scaffold -> Plan -> ExecutePhases -> VerifyBuild -> {Done | HealRetry -> VerifyBuild} -> {Done | Reverted}`
//!
//! Only build failures are retried. Every other failure ends the run with a
//! [`StageError`] naming the stage. An exhausted heal budget restores the
//! project to its pre-generation snapshot and ends with
//! [`UnrecoverableBuildError`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::agents::agent_loop::AgentLoopConfig;
use crate::agents::healer::Healer;
use crate::agents::planner::Planner;
use crate::agents::summary::SummaryCarrier;
use crate::agents::task::TaskExecutor;
use crate::core::plan::Plan;
use crate::core::types::{GenerationEvent, GenerationStage};
use crate::io::build::{BuildOutcome, BuildVerifier, CommandBuildVerifier};
use crate::io::config::ForgeConfig;
use crate::io::engine::Engine;
use crate::io::prompt::PromptEngine;
use crate::io::requirements::RequirementTree;
use crate::io::scaffold::{CommandScaffolder, Scaffolder};
use crate::io::search::search_client_from_config;
use crate::io::snapshot::ProjectSnapshot;
use crate::state::{CancelFlag, GenerationLease};
use crate::tools::toolbox::{ProjectToolbox, ToolProvider};

/// Fatal failure of one pipeline stage.
#[derive(Debug)]
pub struct StageError {
    pub stage: GenerationStage,
    source: anyhow::Error,
}

impl StageError {
    pub fn new(stage: GenerationStage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed", self.stage)
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The heal budget ran out without a passing build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecoverableBuildError {
    pub attempts: u32,
    /// Output of the last failed verification.
    pub diagnostic: String,
    pub reverted: bool,
}

impl fmt::Display for UnrecoverableBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not produce a working build after {} heal attempts",
            self.attempts
        )?;
        if self.reverted {
            f.write_str("; the project was reverted to its original requirement documents")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnrecoverableBuildError {}

/// The run was cancelled at a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError {
    pub stage: GenerationStage,
}

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation cancelled during {}", self.stage)
    }
}

impl std::error::Error for CancelledError {}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub plan: Plan,
    /// Final compounding summary.
    pub summary: String,
    pub tasks_executed: usize,
    pub heal_attempts: u32,
}

/// Tunables for one generator, usually derived from [`ForgeConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub loop_config: AgentLoopConfig,
    pub heal_budget: u32,
    pub summary_max_sentences: usize,
    pub summary_max_chars: usize,
    pub preserve_dirs: Vec<String>,
}

impl GeneratorSettings {
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            loop_config: AgentLoopConfig {
                max_reasoning_steps: config.agent.max_reasoning_steps,
            },
            heal_budget: config.heal.max_attempts,
            summary_max_sentences: config.agent.summary_max_sentences,
            summary_max_chars: config.agent.summary_max_chars,
            preserve_dirs: config.scaffold.preserve_dirs.clone(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from_config(&ForgeConfig::default())
    }
}

/// Composes the collaborators of one generation run.
pub struct Generator {
    engine: Arc<dyn Engine>,
    scaffolder: Arc<dyn Scaffolder>,
    verifier: Arc<dyn BuildVerifier>,
    tools: Arc<dyn ToolProvider>,
    prompts: PromptEngine,
    settings: GeneratorSettings,
    cancel: CancelFlag,
}

impl Generator {
    pub fn new(
        engine: Arc<dyn Engine>,
        scaffolder: Arc<dyn Scaffolder>,
        verifier: Arc<dyn BuildVerifier>,
        tools: Arc<dyn ToolProvider>,
        settings: GeneratorSettings,
    ) -> Result<Self> {
        Ok(Self {
            engine,
            scaffolder,
            verifier,
            tools,
            prompts: PromptEngine::new()?,
            settings,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self, stage: GenerationStage) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(%stage, "generation cancelled");
            return Err(CancelledError { stage }.into());
        }
        Ok(())
    }

    fn carrier(&self) -> SummaryCarrier<'_, dyn Engine> {
        SummaryCarrier::new(
            self.engine.as_ref(),
            &self.prompts,
            self.settings.summary_max_sentences,
            self.settings.summary_max_chars,
        )
    }

    /// Run the whole pipeline against `project`, reporting progress to `on_event`.
    #[instrument(skip_all, fields(project = %project.display(), engine = %self.engine.label()))]
    pub fn run<F: FnMut(&GenerationEvent)>(
        &self,
        project: &Path,
        mut on_event: F,
    ) -> Result<GenerationOutcome> {
        let snapshot = ProjectSnapshot::capture(project, &self.settings.preserve_dirs)
            .map_err(|err| StageError::new(GenerationStage::Scaffold, err))?;

        on_event(&GenerationEvent::StageEntered {
            stage: GenerationStage::Scaffold,
        });
        self.scaffold(project, &snapshot, &mut on_event)?;
        self.check_cancelled(GenerationStage::Scaffold)?;

        on_event(&GenerationEvent::StageEntered {
            stage: GenerationStage::Plan,
        });
        let plan = self
            .plan(project)
            .map_err(|err| StageError::new(GenerationStage::Plan, err))?;
        on_event(&GenerationEvent::PlanReady {
            common: plan.common_tasks.len(),
            backend: plan.backend_tasks.len(),
            frontend: plan.frontend_tasks.len(),
        });

        on_event(&GenerationEvent::StageEntered {
            stage: GenerationStage::ExecutePhases,
        });
        let carrier = self.carrier();
        let carry = self.execute_phases(project, &plan, &carrier, &mut on_event)?;
        let tasks_executed = plan.task_count();

        let (summary, heal_attempts) =
            self.verify_and_heal(project, &snapshot, &carrier, carry, &mut on_event)?;
        on_event(&GenerationEvent::StageEntered {
            stage: GenerationStage::Done,
        });
        info!(tasks_executed, heal_attempts, "generation finished");
        Ok(GenerationOutcome {
            plan,
            summary,
            tasks_executed,
            heal_attempts,
        })
    }

    /// Plan an already scaffolded project without executing anything.
    pub fn plan(&self, project: &Path) -> Result<Plan> {
        if !self.scaffolder.is_scaffolded(project) {
            bail!("{} is not scaffolded yet", project.display());
        }
        let tree = RequirementTree::open(project)?;
        let tools = self.tools.planner_tools(project)?;
        Planner::new(self.engine.as_ref(), &self.prompts, &self.settings.loop_config)
            .plan(&tree, &tools)
    }

    fn scaffold<F: FnMut(&GenerationEvent)>(
        &self,
        project: &Path,
        snapshot: &ProjectSnapshot,
        on_event: &mut F,
    ) -> Result<()> {
        if self.scaffolder.is_scaffolded(project) {
            info!("project already scaffolded");
            on_event(&GenerationEvent::ScaffoldSkipped);
            return Ok(());
        }
        if let Err(err) = self.scaffolder.scaffold(project) {
            warn!(err = %format!("{err:#}"), "scaffold failed, restoring project");
            let err = match snapshot.restore() {
                Ok(_) => err,
                Err(restore_err) => {
                    err.context(format!("restoring the project also failed: {restore_err:#}"))
                }
            };
            return Err(StageError::new(GenerationStage::Scaffold, err).into());
        }
        Ok(())
    }

    fn execute_phases<F: FnMut(&GenerationEvent)>(
        &self,
        project: &Path,
        plan: &Plan,
        carrier: &SummaryCarrier<'_, dyn Engine>,
        on_event: &mut F,
    ) -> Result<String> {
        let stage_err = |err| StageError::new(GenerationStage::ExecutePhases, err);
        let tools = self.tools.task_tools(project).map_err(stage_err)?;
        let executor = TaskExecutor::new(
            self.engine.as_ref(),
            &self.prompts,
            &self.settings.loop_config,
            carrier,
        );
        let mut carry = String::new();
        for (phase, tasks) in plan.phases() {
            for (index, task) in tasks.iter().enumerate() {
                self.check_cancelled(GenerationStage::ExecutePhases)?;
                on_event(&GenerationEvent::TaskStarted {
                    phase,
                    index,
                    total: tasks.len(),
                    task: task.clone(),
                });
                carry = executor
                    .execute(task, &carry, &tools)
                    .with_context(|| format!("{phase} task {}", index + 1))
                    .map_err(stage_err)?;
                on_event(&GenerationEvent::TaskCompleted { phase, index });
            }
        }
        Ok(carry)
    }

    fn verify_and_heal<F: FnMut(&GenerationEvent)>(
        &self,
        project: &Path,
        snapshot: &ProjectSnapshot,
        carrier: &SummaryCarrier<'_, dyn Engine>,
        mut carry: String,
        on_event: &mut F,
    ) -> Result<(String, u32)> {
        let budget = self.settings.heal_budget;
        let tools = self
            .tools
            .healer_tools(project)
            .map_err(|err| StageError::new(GenerationStage::HealRetry, err))?;
        let healer = Healer::new(
            self.engine.as_ref(),
            &self.prompts,
            &self.settings.loop_config,
            carrier,
        );
        let mut heal_attempts = 0u32;
        let mut verification = 0u32;
        loop {
            on_event(&GenerationEvent::StageEntered {
                stage: GenerationStage::VerifyBuild,
            });
            verification += 1;
            let outcome = self
                .verifier
                .verify(project)
                .map_err(|err| StageError::new(GenerationStage::VerifyBuild, err))?;
            on_event(&GenerationEvent::BuildChecked {
                verification,
                passed: outcome.passed(),
            });
            let diagnostic = match outcome {
                BuildOutcome::Passed => return Ok((carry, heal_attempts)),
                BuildOutcome::Failed { diagnostic } => diagnostic,
            };

            if heal_attempts >= budget {
                warn!(heal_attempts, "heal budget exhausted, reverting project");
                on_event(&GenerationEvent::StageEntered {
                    stage: GenerationStage::Reverted,
                });
                snapshot
                    .restore()
                    .map_err(|err| StageError::new(GenerationStage::Reverted, err))?;
                on_event(&GenerationEvent::Reverted);
                return Err(UnrecoverableBuildError {
                    attempts: heal_attempts,
                    diagnostic,
                    reverted: true,
                }
                .into());
            }

            self.check_cancelled(GenerationStage::HealRetry)?;
            heal_attempts += 1;
            on_event(&GenerationEvent::StageEntered {
                stage: GenerationStage::HealRetry,
            });
            on_event(&GenerationEvent::HealStarted {
                attempt: heal_attempts,
                budget,
            });
            carry = healer
                .heal(&diagnostic, &carry, &tools)
                .map_err(|err| StageError::new(GenerationStage::HealRetry, err))?;
        }
    }
}

/// Run a generation for the leased project with collaborators built from `config`.
pub fn run_with_config<F: FnMut(&GenerationEvent)>(
    lease: &GenerationLease<'_>,
    config: &ForgeConfig,
    cancel: CancelFlag,
    on_event: F,
) -> Result<GenerationOutcome> {
    let project = lease.project_path()?;
    generator_from_config(lease.engine(), config)?
        .with_cancel(cancel)
        .run(project, on_event)
}

/// Wire the default collaborators: the scaffold command, the build command,
/// and project tools with web search when configured.
pub fn generator_from_config(engine: Arc<dyn Engine>, config: &ForgeConfig) -> Result<Generator> {
    let search = search_client_from_config(&config.search)?;
    Generator::new(
        engine,
        Arc::new(CommandScaffolder::new(&config.scaffold)),
        Arc::new(CommandBuildVerifier::new(&config.build)),
        Arc::new(ProjectToolbox::new(
            config.npm.clone(),
            config.build.clone(),
            search,
        )),
        GeneratorSettings::from_config(config),
    )
}
