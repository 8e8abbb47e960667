//! In-memory snapshot of a project directory, used to revert a failed generation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

/// Every file, directory and symlink under a project root at capture time.
///
/// Directories named in `preserve_dirs` (e.g. `.git`, `node_modules`) are not
/// read. Only whether they existed is remembered: restore leaves pre-existing
/// ones alone and deletes ones created since. Symlinks are recorded by target
/// and never followed.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    root: PathBuf,
    preserve_dirs: Vec<String>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    links: BTreeMap<PathBuf, PathBuf>,
    dirs: BTreeSet<PathBuf>,
    preserved: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub removed: usize,
    pub written: usize,
}

impl ProjectSnapshot {
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn capture(root: &Path, preserve_dirs: &[String]) -> Result<Self> {
        if !root.is_dir() {
            bail!("project directory {} does not exist", root.display());
        }
        let mut snapshot = Self {
            root: root.to_path_buf(),
            preserve_dirs: preserve_dirs.to_vec(),
            files: BTreeMap::new(),
            links: BTreeMap::new(),
            dirs: BTreeSet::new(),
            preserved: BTreeSet::new(),
        };
        snapshot.capture_tree()?;
        debug!(
            files = snapshot.files.len(),
            links = snapshot.links.len(),
            dirs = snapshot.dirs.len(),
            "snapshot captured"
        );
        Ok(snapshot)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn is_preserved(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.preserve_dirs.iter().any(|dir| *dir == name)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    fn walk(&self) -> walkdir::IntoIter {
        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
    }

    fn capture_tree(&mut self) -> Result<()> {
        let mut walk = self.walk();
        while let Some(entry) = walk.next() {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            let path = entry.path();
            let rel = self.relative(path);
            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.is_preserved(&entry) {
                    walk.skip_current_dir();
                    self.preserved.insert(rel);
                } else {
                    self.dirs.insert(rel);
                }
            } else if file_type.is_symlink() {
                let target =
                    fs::read_link(path).with_context(|| format!("read link {}", path.display()))?;
                self.links.insert(rel, target);
            } else if file_type.is_file() {
                let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
                self.files.insert(rel, bytes);
            }
        }
        Ok(())
    }

    /// Make the project tree match the capture again.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn restore(&self) -> Result<RestoreStats> {
        let mut stats = RestoreStats::default();
        if !self.root.is_dir() {
            fs::create_dir_all(&self.root)
                .with_context(|| format!("recreate {}", self.root.display()))?;
        }
        self.prune(&mut stats)?;

        for dir in &self.dirs {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
        }
        for (rel, target) in &self.links {
            let path = self.root.join(rel);
            if fs::read_link(&path).is_ok_and(|current| current == *target) {
                continue;
            }
            make_symlink(target, &path)
                .with_context(|| format!("restore link {}", path.display()))?;
            stats.written += 1;
        }
        for (rel, bytes) in &self.files {
            let path = self.root.join(rel);
            let unchanged = fs::read(&path).is_ok_and(|current| current == *bytes);
            if unchanged {
                continue;
            }
            fs::write(&path, bytes).with_context(|| format!("restore {}", path.display()))?;
            stats.written += 1;
        }
        info!(
            removed = stats.removed,
            written = stats.written,
            "project restored from snapshot"
        );
        Ok(stats)
    }

    /// Remove everything under the root that the snapshot does not know about.
    fn prune(&self, stats: &mut RestoreStats) -> Result<()> {
        let mut walk = self.walk();
        while let Some(entry) = walk.next() {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            let path = entry.path();
            let rel = self.relative(path);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if self.is_preserved(&entry) {
                    walk.skip_current_dir();
                    if self.preserved.contains(&rel) {
                        continue;
                    }
                } else if self.dirs.contains(&rel) {
                    continue;
                } else {
                    walk.skip_current_dir();
                }
                fs::remove_dir_all(path).with_context(|| format!("remove {}", path.display()))?;
                stats.removed += 1;
                continue;
            }

            let known = if file_type.is_symlink() {
                fs::read_link(path).is_ok_and(|target| self.links.get(&rel) == Some(&target))
            } else {
                file_type.is_file() && self.files.contains_key(&rel)
            };
            if !known {
                fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
                stats.removed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let points_at_dir = link
        .parent()
        .is_some_and(|parent| parent.join(target).is_dir());
    if points_at_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
