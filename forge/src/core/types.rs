//! Shared types for generation orchestration.
//!
//! These types describe the pipeline's observable progress. They carry no I/O
//! and serialize to stable JSON for the CLI and the control server.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::plan::Phase;

/// Stage of the generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Scaffold,
    Plan,
    ExecutePhases,
    VerifyBuild,
    HealRetry,
    Done,
    Reverted,
}

impl GenerationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStage::Scaffold => "scaffold",
            GenerationStage::Plan => "plan",
            GenerationStage::ExecutePhases => "execute_phases",
            GenerationStage::VerifyBuild => "verify_build",
            GenerationStage::HealRetry => "heal_retry",
            GenerationStage::Done => "done",
            GenerationStage::Reverted => "reverted",
        }
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress notification emitted while a generation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    StageEntered {
        stage: GenerationStage,
    },
    /// Scaffolding was skipped because the project already carries its marker.
    ScaffoldSkipped,
    PlanReady {
        common: usize,
        backend: usize,
        frontend: usize,
    },
    TaskStarted {
        phase: Phase,
        index: usize,
        total: usize,
        task: String,
    },
    TaskCompleted {
        phase: Phase,
        index: usize,
    },
    BuildChecked {
        verification: u32,
        passed: bool,
    },
    HealStarted {
        attempt: u32,
        budget: u32,
    },
    Reverted,
}

impl fmt::Display for GenerationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationEvent::StageEntered { stage } => write!(f, "stage: {stage}"),
            GenerationEvent::ScaffoldSkipped => f.write_str("scaffold: already scaffolded"),
            GenerationEvent::PlanReady {
                common,
                backend,
                frontend,
            } => write!(
                f,
                "plan: common={common} backend={backend} frontend={frontend}"
            ),
            GenerationEvent::TaskStarted {
                phase,
                index,
                total,
                task,
            } => write!(f, "task: {phase} {}/{total} {task}", index + 1),
            GenerationEvent::TaskCompleted { phase, index } => {
                write!(f, "task done: {phase} {}", index + 1)
            }
            GenerationEvent::BuildChecked {
                verification,
                passed,
            } => write!(f, "build: verification={verification} passed={passed}"),
            GenerationEvent::HealStarted { attempt, budget } => {
                write!(f, "heal: attempt {attempt}/{budget}")
            }
            GenerationEvent::Reverted => f.write_str("reverted: project restored"),
        }
    }
}
