//! Source file discovery and classification.
//!
//! When a compilation database is present and non-empty the scanner yields
//! exactly the files it names; otherwise it walks the tree filtering by
//! extension, excluded directories and exclude patterns.

use crate::config::Settings;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// C/C++ source extensions (lowercase, with dot).
pub const SOURCE_EXTENSIONS: &[&str] = &[".cpp", ".cc", ".cxx", ".c++", ".c"];

/// C/C++ header extensions (lowercase, with dot).
pub const HEADER_EXTENSIONS: &[&str] = &[".h", ".hpp", ".hxx", ".h++", ".hh"];

/// True if the path carries a recognized header extension.
pub fn is_header(path: &Path) -> bool {
    has_extension(path, HEADER_EXTENSIONS)
}

/// True if the path carries a recognized source extension.
pub fn is_source(path: &Path) -> bool {
    has_extension(path, SOURCE_EXTENSIONS)
}

fn has_extension(path: &Path, set: &[&str]) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    set.iter().any(|ext| name.ends_with(ext))
}

/// Enumerates candidate files and classifies project vs. dependency vs.
/// excluded.
pub struct FileScanner {
    project_root: PathBuf,
    settings: Arc<Settings>,
    exclude_dirs: HashSet<String>,
    dependency_dirs: HashSet<String>,
}

impl FileScanner {
    pub fn new(project_root: PathBuf, settings: Arc<Settings>) -> Self {
        let exclude_dirs = settings.exclude_directories.iter().cloned().collect();
        let dependency_dirs = settings.dependency_directories.iter().cloned().collect();
        Self {
            project_root,
            settings,
            exclude_dirs,
            dependency_dirs,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Walk the project tree for indexable C/C++ files.
    ///
    /// `include_dependencies` controls whether dependency directories are
    /// entered at all. Ordering is stable (sorted) so progress output is
    /// deterministic.
    pub fn find_files(&self, include_dependencies: bool) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(&self.project_root);
        builder
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .require_git(false);

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| is_source(path) || is_header(path))
            .filter(|path| !self.in_excluded_dir(path))
            .filter(|path| include_dependencies || !self.in_dependency_dir(path))
            .filter(|path| !self.matches_exclude_pattern(path))
            .collect();
        files.sort();
        files
    }

    /// True when the file lies under the project root, outside excluded
    /// directories, and outside dependency directories. This gates
    /// `is_project` on symbols and the refresher's deletion logic.
    pub fn is_project_file(&self, path: &Path) -> bool {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        if !abs.starts_with(&self.project_root) {
            return false;
        }
        !self.in_excluded_dir(&abs) && !self.in_dependency_dir(&abs)
    }

    fn in_excluded_dir(&self, path: &Path) -> bool {
        self.components_hit(path, &self.exclude_dirs)
    }

    fn in_dependency_dir(&self, path: &Path) -> bool {
        self.components_hit(path, &self.dependency_dirs)
    }

    fn components_hit(&self, path: &Path, names: &HashSet<String>) -> bool {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|name| names.contains(name))
        })
    }

    fn matches_exclude_pattern(&self, path: &Path) -> bool {
        if self.settings.exclude_patterns.is_empty() {
            return false;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.settings.exclude_patterns.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(name) || p.matches(&path.to_string_lossy()))
                .unwrap_or(false)
        })
    }
}
