//! Noise filter for raw filesystem events.
//!
//! Matching is per path component, so `.git` ignores `.git/index` but not
//! `.github/workflows/ci.yml`. File names are also checked against scratch
//! prefixes (`.tmpXXXX`, `.#file`) and noise suffixes.

use std::collections::BTreeSet;
use std::path::{Component, Path};

pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".vscode",
    ".idea",
    "cargo-target-supervm",
];

pub const DEFAULT_IGNORED_SUFFIXES: &[&str] = &[
    ".log",
    ".db",
    ".db-journal",
    ".db-wal",
    ".db-shm",
    ".lock",
    ".tmp",
    ".swp",
    "~",
];

/// File-name prefixes of editor and tempfile scratch files.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] =
    &[".tmp", ".#", crate::checkpoint::TEMP_FILE_PREFIX];

#[derive(Debug, Clone)]
pub struct IgnoreSet {
    dir_names: BTreeSet<String>,
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    exact_paths: BTreeSet<String>,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self {
            dir_names: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            suffixes: DEFAULT_IGNORED_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exact_paths: BTreeSet::new(),
        }
    }
}

impl IgnoreSet {
    /// Defaults plus the generated docs index and configured extras.
    ///
    /// Extras of the form `*.ext` are suffixes, extras containing `/` are
    /// repository-relative paths, anything else is a directory name.
    pub fn new(docs_index_file: Option<&str>, extras: &[String]) -> Self {
        let mut set = Self::default();
        if let Some(index) = docs_index_file {
            set.exact_paths.insert(normalize(index));
        }
        for extra in extras {
            set.add(extra);
        }
        set
    }

    pub fn add(&mut self, pattern: &str) {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return;
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            self.suffixes.push(suffix.to_string());
        } else if pattern.contains('/') {
            self.exact_paths
                .insert(normalize(pattern).trim_end_matches('/').to_string());
        } else {
            self.dir_names.insert(pattern.to_string());
        }
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let rel_path = normalize(rel_path);
        if self
            .exact_paths
            .iter()
            .any(|exact| rel_path == *exact || rel_path.starts_with(&format!("{exact}/")))
        {
            return true;
        }

        if rel_path
            .split('/')
            .any(|component| self.dir_names.contains(component))
        {
            return true;
        }

        let file_name = rel_path.rsplit('/').next().unwrap_or(&rel_path);
        self.prefixes
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()))
            || self
                .suffixes
                .iter()
                .any(|suffix| file_name.ends_with(suffix.as_str()))
    }
}

/// Repository-relative forward-slash path, or `None` when `path` lies
/// outside `repo_root`.
pub fn relative_path(repo_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(repo_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").to_string()
}
