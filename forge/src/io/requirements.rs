//! Requirement-document tree under `<project>/prompts/`.
//!
//! Every directory may hold an `index.txt` describing the route at that
//! position. The root document describes the whole site and is mandatory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::{DirEntry, FilterEntry, WalkDir};

/// Marker directory holding the requirement tree inside a scaffolded project.
pub const REQUIREMENTS_DIR: &str = "prompts";
/// File name of a requirement document.
pub const REQUIREMENT_FILE: &str = "index.txt";

/// One requirement document, tagged with its route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementDoc {
    /// `/` for the root document, otherwise the directory path relative to the
    /// tree root with `/` separators (e.g. `blog/post`).
    pub tag: String,
    pub path: PathBuf,
    pub content: String,
}

impl RequirementDoc {
    /// Text of the human message that introduces this document to the planner.
    pub fn to_prompt(&self) -> String {
        format!("{}: -\n\n{}", self.tag, self.content)
    }
}

#[derive(Debug, Clone)]
pub struct RequirementTree {
    root: PathBuf,
}

impl RequirementTree {
    /// Open the tree of a scaffolded project.
    pub fn open(project: &Path) -> Result<Self> {
        Self::at(project.join(REQUIREMENTS_DIR))
    }

    /// Open a tree rooted at `root`. The root document must exist.
    pub fn at(root: PathBuf) -> Result<Self> {
        let root_doc = root.join(REQUIREMENT_FILE);
        if !root_doc.is_file() {
            bail!("missing root requirement document {}", root_doc.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh depth-first walk: root document first, then subdirectories in
    /// lexicographic order, each fully visited before its next sibling.
    ///
    /// Hidden directories and symlinked directories are not entered.
    pub fn iter(&self) -> RequirementDocs {
        let walk = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool);
        RequirementDocs {
            root: self.root.clone(),
            walk: Some(walk),
        }
    }
}

fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
}

/// Lazy iterator over the non-blank documents of a [`RequirementTree`].
pub struct RequirementDocs {
    root: PathBuf,
    walk: Option<FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>>,
}

impl RequirementDocs {
    fn visit(&self, dir: &Path) -> Result<Option<RequirementDoc>> {
        let doc_path = dir.join(REQUIREMENT_FILE);
        if !doc_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&doc_path)
            .with_context(|| format!("read requirement document {}", doc_path.display()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(RequirementDoc {
            tag: self.tag_for(dir),
            path: doc_path,
            content,
        }))
    }

    fn tag_for(&self, dir: &Path) -> String {
        let relative = dir.strip_prefix(&self.root).unwrap_or(dir);
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            "/".to_string()
        } else {
            parts.join("/")
        }
    }
}

impl Iterator for RequirementDocs {
    type Item = Result<RequirementDoc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = self.walk.as_mut()?.next()?;
            let visited = step
                .with_context(|| format!("walk requirement tree {}", self.root.display()))
                .and_then(|entry| {
                    if entry.file_type().is_dir() {
                        self.visit(entry.path())
                    } else {
                        Ok(None)
                    }
                });
            match visited {
                Ok(Some(doc)) => return Some(Ok(doc)),
                Ok(None) => {}
                Err(err) => {
                    self.walk = None;
                    return Some(Err(err));
                }
            }
        }
    }
}
