//! Shared application state for the control server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use forge::core::types::GenerationEvent;
use forge::generate::{CancelledError, Generator, UnrecoverableBuildError, generator_from_config};
use forge::io::config::{EngineConfig, ForgeConfig};
use forge::io::engine::{Engine, OllamaEngine};
use forge::state::{CancelFlag, SharedProjectState};
use serde::Serialize;
use tokio::sync::{Notify, broadcast, oneshot};
use tracing::{info, warn};

/// Builds the generator for one run from the engine held by the lease.
pub type GeneratorFactory =
    Arc<dyn Fn(Arc<dyn Engine>, &ForgeConfig) -> Result<Generator> + Send + Sync>;

/// Builds a reasoning engine for `POST /api/engine`.
pub type EngineFactory = Arc<dyn Fn(&EngineConfig) -> Result<Arc<dyn Engine>> + Send + Sync>;

/// Events broadcast to SSE clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    Started { project: PathBuf },
    Progress { event: GenerationEvent },
    Finished { report: RunReport },
    EngineSwapped { engine: String },
}

/// How the most recent generation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunReport {
    Succeeded {
        project: PathBuf,
        tasks_executed: usize,
        heal_attempts: u32,
        summary: String,
    },
    Reverted {
        project: PathBuf,
        error: String,
    },
    Cancelled {
        project: PathBuf,
    },
    Failed {
        project: PathBuf,
        error: String,
    },
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub project: SharedProjectState,
    pub config: Arc<ForgeConfig>,
    pub cancel: CancelFlag,
    /// Broadcast sender for generation progress.
    pub event_tx: Arc<broadcast::Sender<StatusEvent>>,
    pub shutdown: Arc<Notify>,
    pub last_run: Arc<Mutex<Option<RunReport>>>,
    generators: GeneratorFactory,
    engines: EngineFactory,
}

impl AppState {
    pub fn new(config: ForgeConfig, engine: Arc<dyn Engine>) -> Self {
        Self::with_factories(
            config,
            engine,
            Arc::new(generator_from_config),
            Arc::new(|config: &EngineConfig| -> Result<Arc<dyn Engine>> {
                Ok(Arc::new(OllamaEngine::new(config)?))
            }),
        )
    }

    pub fn with_factories(
        config: ForgeConfig,
        engine: Arc<dyn Engine>,
        generators: GeneratorFactory,
        engines: EngineFactory,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            project: SharedProjectState::new(engine),
            config: Arc::new(config),
            cancel: CancelFlag::new(),
            event_tx: Arc::new(event_tx),
            shutdown: Arc::new(Notify::new()),
            last_run: Arc::new(Mutex::new(None)),
            generators,
            engines,
        }
    }

    pub fn publish(&self, event: StatusEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.event_tx.send(event);
    }

    pub fn last_run(&self) -> Option<RunReport> {
        self.last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Build an engine and install it, unless a generation holds the state.
    ///
    /// Blocking: call from a blocking worker.
    pub fn swap_engine(&self, config: &EngineConfig) -> Result<String> {
        let engine = (self.engines)(config)?;
        let label = engine.label();
        self.project.try_swap_engine(engine)?;
        self.publish(StatusEvent::EngineSwapped {
            engine: label.clone(),
        });
        Ok(label)
    }

    /// Run one generation to completion on the calling (blocking) thread.
    ///
    /// `ready` is answered as soon as the lease is taken or refused, so the
    /// HTTP handler can reply without waiting for the pipeline.
    pub fn run_generation(&self, project: PathBuf, ready: oneshot::Sender<Result<()>>) {
        let mut lease = match self.project.try_begin() {
            Ok(lease) => lease,
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        lease.set_project_path(&project);
        let _ = ready.send(Ok(()));

        info!(project = %project.display(), "generation started");
        self.publish(StatusEvent::Started {
            project: project.clone(),
        });
        let result = (self.generators)(lease.engine(), self.config.as_ref()).and_then(
            |generator| {
                generator
                    .with_cancel(self.cancel.clone())
                    .run(&project, |event| {
                        self.publish(StatusEvent::Progress {
                            event: event.clone(),
                        });
                    })
            },
        );

        let report = match result {
            Ok(outcome) => RunReport::Succeeded {
                project,
                tasks_executed: outcome.tasks_executed,
                heal_attempts: outcome.heal_attempts,
                summary: outcome.summary,
            },
            Err(err) => report_failure(project, &err),
        };
        info!(?report, "generation finished");
        // A cancel that raced the start of this run was honoured above; clear
        // it while still holding the lease so it cannot leak into the next run.
        self.cancel.reset();
        // Recorded before the lease is released so status never shows idle
        // without the report.
        *self
            .last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        drop(lease);
        self.publish(StatusEvent::Finished { report });
    }
}

fn report_failure(project: PathBuf, err: &anyhow::Error) -> RunReport {
    let error = format!("{err:#}");
    warn!(%error, "generation failed");
    if err.downcast_ref::<UnrecoverableBuildError>().is_some() {
        RunReport::Reverted { project, error }
    } else if err.downcast_ref::<CancelledError>().is_some() {
        RunReport::Cancelled { project }
    } else {
        RunReport::Failed { project, error }
    }
}

/// Resolve a requested project directory.
pub fn resolve_project(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    let resolved = path.canonicalize().map_err(|err| {
        anyhow::anyhow!("project directory {} is not accessible: {err}", path.display())
    })?;
    if !resolved.is_dir() {
        anyhow::bail!("{} is not a directory", resolved.display());
    }
    Ok(resolved)
}
