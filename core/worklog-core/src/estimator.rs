//! Line-delta estimation for changed files.
//!
//! [`ChangeEstimator`] is the port the aggregator calls once per coalesced
//! file. [`GitDiffEstimator`] shells out to `git diff HEAD` with a deadline.
//! Every failure degrades to [`LineDelta::ZERO`] and is logged; nothing here
//! returns an error.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EstimatorConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const LOW_THRESHOLD: u64 = 10;
const MEDIUM_THRESHOLD: u64 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub added: u64,
    pub removed: u64,
}

impl LineDelta {
    pub const ZERO: LineDelta = LineDelta {
        added: 0,
        removed: 0,
    };

    pub fn new(added: u64, removed: u64) -> Self {
        Self { added, removed }
    }

    pub fn total(&self) -> u64 {
        self.added.saturating_add(self.removed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Magnitude {
    Low,
    Medium,
    High,
}

impl Magnitude {
    pub fn classify(delta: LineDelta) -> Self {
        Self::from_total(delta.total())
    }

    pub fn from_total(total: u64) -> Self {
        if total < LOW_THRESHOLD {
            Magnitude::Low
        } else if total < MEDIUM_THRESHOLD {
            Magnitude::Medium
        } else {
            Magnitude::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Magnitude::Low => "LOW",
            Magnitude::Medium => "MEDIUM",
            Magnitude::High => "HIGH",
        }
    }
}

/// Computes line deltas for one repository-relative path.
pub trait ChangeEstimator {
    fn estimate(&self, rel_path: &str, repo_root: &Path) -> LineDelta;
}

impl<T: ChangeEstimator + ?Sized> ChangeEstimator for &T {
    fn estimate(&self, rel_path: &str, repo_root: &Path) -> LineDelta {
        (**self).estimate(rel_path, repo_root)
    }
}

impl<T: ChangeEstimator + ?Sized> ChangeEstimator for Box<T> {
    fn estimate(&self, rel_path: &str, repo_root: &Path) -> LineDelta {
        (**self).estimate(rel_path, repo_root)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Git Adapter
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct GitDiffEstimator {
    git_binary: PathBuf,
    timeout: Duration,
}

impl Default for GitDiffEstimator {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}

enum GitOutcome {
    Success(String),
    Failed,
}

impl GitDiffEstimator {
    pub fn new(git_binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            git_binary: git_binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(&config.git_binary, config.diff_timeout())
    }

    fn run_git(&self, repo_root: &Path, args: &[&str]) -> std::io::Result<Option<GitOutcome>> {
        let mut child = Command::new(&self.git_binary)
            .args(args)
            .current_dir(repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Drain stdout on a helper thread so a large diff cannot fill the pipe
        // while the deadline is polled.
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf);
                buf
            })
        });

        let status = match wait_with_deadline(&mut child, self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
        };

        let stdout = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(Some(GitOutcome::Success(
                String::from_utf8_lossy(&stdout).into_owned(),
            )))
        } else {
            Ok(Some(GitOutcome::Failed))
        }
    }

    fn is_untracked(&self, rel_path: &str, repo_root: &Path) -> bool {
        matches!(
            self.run_git(repo_root, &["ls-files", "--error-unmatch", "--", rel_path]),
            Ok(Some(GitOutcome::Failed))
        )
    }
}

impl ChangeEstimator for GitDiffEstimator {
    fn estimate(&self, rel_path: &str, repo_root: &Path) -> LineDelta {
        let absolute = repo_root.join(rel_path);
        if !absolute.is_file() {
            tracing::debug!(path = %rel_path, "File no longer exists; zero delta");
            return LineDelta::ZERO;
        }

        match self.run_git(repo_root, &["diff", "HEAD", "--", rel_path]) {
            Ok(Some(GitOutcome::Success(diff))) if !diff.trim().is_empty() => {
                count_diff_lines(&diff)
            }
            Ok(Some(GitOutcome::Success(_))) => {
                if self.is_untracked(rel_path, repo_root) {
                    count_file_lines(&absolute)
                } else {
                    LineDelta::ZERO
                }
            }
            // No prior committed version (no HEAD, not a repository).
            Ok(Some(GitOutcome::Failed)) => count_file_lines(&absolute),
            Ok(None) => {
                tracing::warn!(
                    path = %rel_path,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "git diff timed out; zero delta"
                );
                LineDelta::ZERO
            }
            Err(err) => {
                tracing::warn!(
                    path = %rel_path,
                    git = %self.git_binary.display(),
                    error = %err,
                    "git diff failed to run; zero delta"
                );
                LineDelta::ZERO
            }
        }
    }
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Counts `+`/`-` content lines of a unified diff, skipping file headers.
pub fn count_diff_lines(diff: &str) -> LineDelta {
    diff.lines().fold(LineDelta::ZERO, |mut delta, line| {
        if line.starts_with("+++") || line.starts_with("---") {
            return delta;
        }
        if line.starts_with('+') {
            delta.added += 1;
        } else if line.starts_with('-') {
            delta.removed += 1;
        }
        delta
    })
}

/// Treats every line currently on disk as added.
pub fn count_file_lines(path: &Path) -> LineDelta {
    match fs_err::read(path) {
        Ok(bytes) => LineDelta::new(String::from_utf8_lossy(&bytes).lines().count() as u64, 0),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "Unable to count lines");
            LineDelta::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_headers_are_not_counted() {
        let diff = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,4 +1,6 @@
 fn a() {}
-fn b() {}
+fn x() {}
+fn y() {}
+fn z() {}
 fn c() {}
";
        assert_eq!(count_diff_lines(diff), LineDelta::new(3, 1));
    }

    #[test]
    fn magnitude_thresholds() {
        assert_eq!(Magnitude::classify(LineDelta::new(9, 0)), Magnitude::Low);
        assert_eq!(Magnitude::classify(LineDelta::new(5, 5)), Magnitude::Medium);
        assert_eq!(Magnitude::classify(LineDelta::new(40, 9)), Magnitude::Medium);
        assert_eq!(Magnitude::classify(LineDelta::new(25, 25)), Magnitude::High);
        assert_eq!(Magnitude::High.as_str(), "HIGH");
    }

    #[test]
    fn missing_file_is_zero_delta() {
        let temp = tempfile::tempdir().expect("temp dir");
        let estimator = GitDiffEstimator::default();
        assert_eq!(estimator.estimate("gone.rs", temp.path()), LineDelta::ZERO);
    }

    #[test]
    fn unrunnable_git_is_zero_delta() {
        let temp = tempfile::tempdir().expect("temp dir");
        fs_err::write(temp.path().join("a.txt"), "one\ntwo\n").expect("write");
        let estimator =
            GitDiffEstimator::new("/nonexistent/bin/git-missing", Duration::from_secs(1));
        assert_eq!(estimator.estimate("a.txt", temp.path()), LineDelta::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn slow_diff_is_cut_off_at_timeout() {
        let temp = tempfile::tempdir().expect("temp dir");
        fs_err::write(temp.path().join("a.txt"), "one\ntwo\n").expect("write");
        // `sh diff HEAD -- a.txt` runs this script from the repo root.
        fs_err::write(temp.path().join("diff"), "sleep 10\n").expect("script");

        let estimator = GitDiffEstimator::new("/bin/sh", Duration::from_millis(300));
        let started = std::time::Instant::now();
        let delta = estimator.estimate("a.txt", temp.path());

        assert_eq!(delta, LineDelta::ZERO);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "not bounded: {elapsed:?}");
    }

    #[test]
    fn count_file_lines_handles_missing_trailing_newline() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("notes.md");
        fs_err::write(&path, "a\nb\nc").expect("write");
        assert_eq!(count_file_lines(&path), LineDelta::new(3, 0));
    }
}
