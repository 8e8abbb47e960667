//! Lock-guarded project state shared by the front ends and the pipeline.
//!
//! A generation holds the lock for its whole run through a
//! [`GenerationLease`]. Engine swaps and project changes take the same lock, so
//! they can never interleave with a running generation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{debug, info};

use crate::io::engine::Engine;

/// Returned when the state is locked by a running generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationInProgressError;

impl fmt::Display for GenerationInProgressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a project generation is already in progress")
    }
}

impl std::error::Error for GenerationInProgressError {}

pub struct ProjectState {
    pub project_path: Option<PathBuf>,
    pub engine: Arc<dyn Engine>,
}

/// Status view that never waits for a running generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub busy: bool,
    /// `None` while busy, or when no project was ever set.
    pub project_path: Option<PathBuf>,
    /// `None` while busy.
    pub engine: Option<String>,
}

#[derive(Clone)]
pub struct SharedProjectState {
    inner: Arc<Mutex<ProjectState>>,
}

impl SharedProjectState {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProjectState {
                project_path: None,
                engine,
            })),
        }
    }

    fn try_guard(&self) -> Result<MutexGuard<'_, ProjectState>> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            // A panicked generation leaves nothing half-written in this record.
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(GenerationInProgressError.into()),
        }
    }

    /// Take the lock for a whole generation run.
    pub fn try_begin(&self) -> Result<GenerationLease<'_>> {
        let guard = self.try_guard()?;
        debug!("generation lease acquired");
        Ok(GenerationLease { guard })
    }

    pub fn try_swap_engine(&self, engine: Arc<dyn Engine>) -> Result<()> {
        let mut guard = self.try_guard()?;
        info!(from = %guard.engine.label(), to = %engine.label(), "swapping engine");
        guard.engine = engine;
        Ok(())
    }

    pub fn try_set_project_path(&self, path: &Path) -> Result<()> {
        let mut guard = self.try_guard()?;
        guard.project_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Label of the active engine, or `None` while a generation runs.
    pub fn current_engine_label(&self) -> Option<String> {
        self.try_guard().ok().map(|guard| guard.engine.label())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        match self.try_guard() {
            Ok(guard) => StateSnapshot {
                busy: false,
                project_path: guard.project_path.clone(),
                engine: Some(guard.engine.label()),
            },
            Err(_) => StateSnapshot {
                busy: true,
                project_path: None,
                engine: None,
            },
        }
    }
}

/// Exclusive access to the project state for the duration of one generation.
pub struct GenerationLease<'a> {
    guard: MutexGuard<'a, ProjectState>,
}

impl GenerationLease<'_> {
    pub fn project_path(&self) -> Result<&Path> {
        self.guard
            .project_path
            .as_deref()
            .ok_or_else(|| anyhow!("no project path is set"))
    }

    pub fn set_project_path(&mut self, path: &Path) {
        self.guard.project_path = Some(path.to_path_buf());
    }

    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.guard.engine)
    }
}

/// Cooperative cancellation, observed between tasks and between heal attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEngine;

    fn state() -> SharedProjectState {
        SharedProjectState::new(Arc::new(ScriptedEngine::new(Vec::new())))
    }

    #[test]
    fn second_generation_is_rejected_while_first_runs() {
        let state = state();
        let lease = state.try_begin().expect("first");
        let err = state.try_begin().err().expect("second must fail");
        assert!(err.downcast_ref::<GenerationInProgressError>().is_some());
        drop(lease);
        state.try_begin().expect("free again");
    }

    #[test]
    fn engine_swap_is_refused_during_generation() {
        let state = state();
        let lease = state.try_begin().expect("lease");
        let swap = state.try_swap_engine(Arc::new(ScriptedEngine::labelled("other", Vec::new())));
        assert!(swap.is_err());
        assert_eq!(lease.engine().label(), "scripted");
        drop(lease);

        state
            .try_swap_engine(Arc::new(ScriptedEngine::labelled("other", Vec::new())))
            .expect("swap");
        assert_eq!(state.snapshot().engine.as_deref(), Some("other"));
    }

    #[test]
    fn snapshot_reports_busy_without_blocking() {
        let state = state();
        state
            .try_set_project_path(Path::new("/work/bakery"))
            .expect("set");
        let idle = state.snapshot();
        assert!(!idle.busy);
        assert_eq!(idle.project_path, Some(PathBuf::from("/work/bakery")));

        let _lease = state.try_begin().expect("lease");
        let busy = state.snapshot();
        assert!(busy.busy);
        assert_eq!(busy.engine, None);
        assert_eq!(state.current_engine_label(), None);
    }

    #[test]
    fn lease_requires_a_project_path() {
        let state = state();
        let mut lease = state.try_begin().expect("lease");
        assert!(lease.project_path().is_err());
        lease.set_project_path(Path::new("/work/site"));
        assert_eq!(lease.project_path().expect("path"), Path::new("/work/site"));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        flag.cancel();
        assert!(observer.is_cancelled());
        observer.reset();
        assert!(!flag.is_cancelled());
    }
}
