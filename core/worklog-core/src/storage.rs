//! Storage configuration and path management for worklog.
//!
//! Every path worklog reads or writes is decided here. Production code uses
//! [`StorageConfig::from_env`] (`$WORKLOG_HOME`, else `~/.worklog`); tests use
//! [`StorageConfig::with_root`] with a temp directory.
//!
//! ## Layout
//!
//! ```text
//! ~/.worklog/
//! ├── worklog.db                     # sessions + changelog store
//! ├── config.toml                    # optional runtime config
//! ├── logs/                          # rolling log files
//! └── repos/{md5(repo path)}/
//!     ├── current_session.json       # active session checkpoint
//!     ├── work_note_input.json       # annotations for the next record
//!     ├── watcher.pid                # pid of the running watcher
//!     └── archive/session_{id}.json  # finalized snapshots
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, WorklogError};

pub const HOME_ENV: &str = "WORKLOG_HOME";

/// Central configuration for all worklog storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `$WORKLOG_HOME` or the user's home directory.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self {
                root: PathBuf::from(root),
            });
        }
        let home = dirs::home_dir().ok_or(WorklogError::HomeNotFound)?;
        Ok(Self {
            root: home.join(".worklog"),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Files
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn db_file(&self) -> PathBuf {
        self.root.join("worklog.db")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Per-Repository Paths
    // ─────────────────────────────────────────────────────────────────────────────

    /// Data directory for one repository, keyed by the md5 of its path so that
    /// each repository gets exactly one checkpoint slot.
    pub fn repo_data_dir(&self, repo_root: &Path) -> PathBuf {
        self.root.join("repos").join(repo_key(repo_root))
    }

    pub fn checkpoint_file(&self, repo_root: &Path) -> PathBuf {
        self.repo_data_dir(repo_root).join("current_session.json")
    }

    pub fn archive_dir(&self, repo_root: &Path) -> PathBuf {
        self.repo_data_dir(repo_root).join("archive")
    }

    pub fn annotations_file(&self, repo_root: &Path) -> PathBuf {
        self.repo_data_dir(repo_root).join("work_note_input.json")
    }

    pub fn pid_file(&self, repo_root: &Path) -> PathBuf {
        self.repo_data_dir(repo_root).join("watcher.pid")
    }

    /// Ensures the root and the repository's data directories exist.
    pub fn ensure_repo_dirs(&self, repo_root: &Path) -> Result<()> {
        let archive = self.archive_dir(repo_root);
        fs_err::create_dir_all(&archive)
            .map_err(|err| WorklogError::io("Failed to create worklog data dir", err))
    }
}

/// Stable key for a repository path.
pub fn repo_key(repo_root: &Path) -> String {
    format!("{:x}", md5::compute(repo_root.to_string_lossy().as_bytes()))
}

/// Canonicalizes a repository root, failing when it does not exist.
pub fn resolve_repo_root(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(WorklogError::RepoNotFound(path.to_path_buf()));
    }
    fs_err::canonicalize(path).map_err(|_| WorklogError::RepoNotFound(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_paths_live_under_root() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config = StorageConfig::with_root(temp.path().to_path_buf());
        let repo = Path::new("/work/repo");

        let dir = config.repo_data_dir(repo);
        assert!(dir.starts_with(temp.path().join("repos")));
        assert_eq!(config.checkpoint_file(repo), dir.join("current_session.json"));
        assert_eq!(config.archive_dir(repo), dir.join("archive"));
        assert_eq!(config.db_file(), temp.path().join("worklog.db"));
    }

    #[test]
    fn distinct_repos_get_distinct_keys() {
        assert_ne!(
            repo_key(Path::new("/work/a")),
            repo_key(Path::new("/work/b"))
        );
        assert_eq!(repo_key(Path::new("/work/a")), repo_key(Path::new("/work/a")));
    }

    #[test]
    fn resolve_repo_root_rejects_missing_path() {
        let temp = tempfile::tempdir().expect("temp dir");
        let missing = temp.path().join("nope");
        let err = resolve_repo_root(&missing).expect_err("missing repo");
        assert!(matches!(err, WorklogError::RepoNotFound(_)));
    }

    #[test]
    fn ensure_repo_dirs_creates_archive() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config = StorageConfig::with_root(temp.path().join("root"));
        let repo = Path::new("/work/repo");
        config.ensure_repo_dirs(repo).expect("dirs");
        assert!(config.archive_dir(repo).is_dir());
    }
}
