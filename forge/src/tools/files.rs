//! Project file tools: read, write and list files under the project root.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tracing::debug;
use walkdir::WalkDir;

use crate::tools::{Tool, string_arg};

pub const PACKAGE_MANIFEST: &str = "package.json";
pub const PACKAGE_LOCK: &str = "package-lock.json";

/// Directories never listed; they are large and generated.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", ".next"];
const MAX_LISTED_ENTRIES: usize = 500;

/// Resolve a project-relative path (`/` is the project root).
///
/// Refuses `..` and any component that would escape the root.
pub fn resolve_project_path(root: &Path, requested: &str) -> Result<PathBuf> {
    let trimmed = requested.trim();
    let mut resolved = root.to_path_buf();
    for component in Path::new(trimmed).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => bail!("path '{trimmed}' must not contain '..'"),
            Component::Prefix(_) => bail!("path '{trimmed}' must be relative to the project root"),
        }
    }
    Ok(resolved)
}

fn relative_display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
        Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
        Err(_) => path.display().to_string(),
    }
}

fn is_top_level(root: &Path, path: &Path, name: &str) -> bool {
    path == root.join(name)
}

fn path_parameters(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": description }
        },
        "required": ["path"]
    })
}

/// `read_project_file`: return a file's contents.
pub struct ReadProjectFile {
    root: PathBuf,
}

impl ReadProjectFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ReadProjectFile {
    fn name(&self) -> &str {
        "read_project_file"
    }

    fn description(&self) -> &str {
        "Read a file from the project. Paths are relative to the project root, e.g. /src/app/page.tsx."
    }

    fn parameters(&self) -> Value {
        path_parameters("Project-relative file path")
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let requested = string_arg(args, "path")?;
        let path = resolve_project_path(&self.root, requested)?;
        if is_top_level(&self.root, &path, PACKAGE_LOCK) {
            bail!("{PACKAGE_LOCK} is managed by npm and cannot be read; use list_dependencies");
        }
        if path.is_dir() {
            bail!("{} is a directory; use list_project_files", relative_display(&self.root, &path));
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read {}", relative_display(&self.root, &path)))?;
        debug!(path = %path.display(), bytes = contents.len(), "read project file");
        Ok(contents)
    }
}

/// `write_project_file`: create or overwrite a file, creating parent directories.
pub struct WriteProjectFile {
    root: PathBuf,
}

impl WriteProjectFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for WriteProjectFile {
    fn name(&self) -> &str {
        "write_project_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a project file with the given content. package.json and package-lock.json cannot be written; use the dependency tools instead."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Project-relative file path" },
                "content": { "type": "string", "description": "Complete new file content" }
            },
            "required": ["path", "content"]
        })
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let requested = string_arg(args, "path")?;
        let content = string_arg(args, "content")?;
        let path = resolve_project_path(&self.root, requested)?;
        if path == self.root {
            bail!("a file path is required");
        }
        for protected in [PACKAGE_MANIFEST, PACKAGE_LOCK] {
            if is_top_level(&self.root, &path, protected) {
                bail!("{protected} cannot be written directly; use the dependency tools");
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", relative_display(&self.root, parent)))?;
        }
        fs::write(&path, content)
            .with_context(|| format!("write {}", relative_display(&self.root, &path)))?;
        let shown = relative_display(&self.root, &path);
        debug!(path = %shown, bytes = content.len(), "wrote project file");
        Ok(format!("Wrote {} bytes to {shown}", content.len()))
    }
}

/// `list_project_files`: recursive listing of a project directory.
pub struct ListProjectFiles {
    root: PathBuf,
}

impl ListProjectFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ListProjectFiles {
    fn name(&self) -> &str {
        "list_project_files"
    }

    fn description(&self) -> &str {
        "List files below a project directory (default: the project root). Directories end with '/'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Project-relative directory, default /" }
            }
        })
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<String> {
        let requested = args.get("path").and_then(Value::as_str).unwrap_or("/");
        let dir = resolve_project_path(&self.root, requested)?;
        if !dir.is_dir() {
            bail!("{} is not a directory", relative_display(&self.root, &dir));
        }
        let mut entries = Vec::new();
        collect_entries(&self.root, &dir, &mut entries)?;
        if entries.is_empty() {
            return Ok(format!("{} is empty", relative_display(&self.root, &dir)));
        }
        let total = entries.len();
        entries.truncate(MAX_LISTED_ENTRIES);
        let mut listing = entries.join("\n");
        if total > MAX_LISTED_ENTRIES {
            listing.push_str(&format!("\n... {} more entries", total - MAX_LISTED_ENTRIES));
        }
        Ok(listing)
    }
}

fn is_skipped(name: &OsStr) -> bool {
    SKIPPED_DIRS.contains(&name.to_string_lossy().as_ref())
}

fn collect_entries(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let walk = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry.file_name()));
    for entry in walk {
        let entry = entry.with_context(|| format!("read directory {}", dir.display()))?;
        if entry.file_type().is_dir() {
            out.push(format!("{}/", relative_display(root, entry.path())));
        } else {
            out.push(relative_display(root, entry.path()));
        }
    }
    Ok(())
}
