//! Per-stage tool sets.
//!
//! The planner only inspects. Task execution may write files and add
//! dependencies. The healer gets the task set plus removal and broader
//! inspection, but nothing the task stage could not already do to the tree.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::io::config::{BuildConfig, NpmConfig};
use crate::io::search::SearchClient;
use crate::tools::ToolRegistry;
use crate::tools::dependencies::{DependencyAction, DependencyTool, ListDependencies};
use crate::tools::files::{ListProjectFiles, ReadProjectFile, WriteProjectFile};
use crate::tools::lint::RunLint;
use crate::tools::search::SearchInternet;

/// Builds a fresh registry for each stage, bound to a project root.
pub trait ToolProvider: Send + Sync {
    fn planner_tools(&self, project: &Path) -> Result<ToolRegistry>;
    fn task_tools(&self, project: &Path) -> Result<ToolRegistry>;
    fn healer_tools(&self, project: &Path) -> Result<ToolRegistry>;
}

/// Tools that act on a real project directory.
pub struct ProjectToolbox {
    npm: NpmConfig,
    build: BuildConfig,
    search: Arc<dyn SearchClient>,
}

impl ProjectToolbox {
    pub fn new(npm: NpmConfig, build: BuildConfig, search: Arc<dyn SearchClient>) -> Self {
        Self { npm, build, search }
    }

    fn dependency(&self, action: DependencyAction, project: &Path) -> DependencyTool {
        DependencyTool::new(action, project, self.npm.clone())
    }
}

impl ToolProvider for ProjectToolbox {
    fn planner_tools(&self, project: &Path) -> Result<ToolRegistry> {
        ToolRegistry::new()
            .with(SearchInternet::new(Arc::clone(&self.search)))?
            .with(ListDependencies::new(project))?
            .with(ListProjectFiles::new(project))?
            .with(ReadProjectFile::new(project))
    }

    fn task_tools(&self, project: &Path) -> Result<ToolRegistry> {
        ToolRegistry::new()
            .with(SearchInternet::new(Arc::clone(&self.search)))?
            .with(ListDependencies::new(project))?
            .with(self.dependency(DependencyAction::Install, project))?
            .with(self.dependency(DependencyAction::InstallDev, project))?
            .with(ReadProjectFile::new(project))?
            .with(WriteProjectFile::new(project))
    }

    fn healer_tools(&self, project: &Path) -> Result<ToolRegistry> {
        let mut registry = self.task_tools(project)?;
        registry.register(Box::new(self.dependency(DependencyAction::Remove, project)))?;
        registry.register(Box::new(self.dependency(DependencyAction::RemoveDev, project)))?;
        registry.register(Box::new(ListProjectFiles::new(project)))?;
        registry.register(Box::new(RunLint::new(project, self.build.clone())))?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::search::UnconfiguredSearch;

    fn toolbox() -> ProjectToolbox {
        ProjectToolbox::new(
            NpmConfig::default(),
            BuildConfig::default(),
            Arc::new(UnconfiguredSearch {
                api_key_env: "SERPER_API_KEY".to_string(),
            }),
        )
    }

    #[test]
    fn planner_tools_never_mutate() {
        let registry = toolbox().planner_tools(Path::new("/project")).expect("planner");
        assert_eq!(
            registry.names(),
            vec![
                "search_internet",
                "list_dependencies",
                "list_project_files",
                "read_project_file"
            ]
        );
    }

    #[test]
    fn healer_extends_task_set() {
        let toolbox = toolbox();
        let task = toolbox.task_tools(Path::new("/project")).expect("task");
        let healer = toolbox.healer_tools(Path::new("/project")).expect("healer");
        for name in task.names() {
            assert!(healer.get(name).is_some(), "healer lacks {name}");
        }
        assert!(task.get("remove_dependencies").is_none());
        assert!(task.get("run_lint").is_none());
        for name in [
            "remove_dependencies",
            "remove_dev_dependencies",
            "list_project_files",
            "run_lint",
        ] {
            assert!(healer.get(name).is_some(), "healer lacks {name}");
        }
    }
}
