//! On-disk snapshots of session state.
//!
//! The working checkpoint is rewritten in full after every mutation (temp file
//! in the same directory, then rename). Finalized sessions are archived as
//! `archive/session_<id>.json` and stay there as the retry source for
//! `worklog record`.

use std::io::Write;
use std::path::{Path, PathBuf};


use crate::error::{Result, WorklogError};
use crate::session::Session;
use crate::storage::StorageConfig;

#[derive(Debug, Clone)]
pub struct SessionCheckpoint {
    checkpoint_path: PathBuf,
    archive_dir: PathBuf,
}

impl SessionCheckpoint {
    pub fn new(checkpoint_path: PathBuf, archive_dir: PathBuf) -> Self {
        Self {
            checkpoint_path,
            archive_dir,
        }
    }

    pub fn for_repo(storage: &StorageConfig, repo_root: &Path) -> Self {
        Self::new(
            storage.checkpoint_file(repo_root),
            storage.archive_dir(repo_root),
        )
    }

    pub fn path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Loads the working checkpoint. Empty or corrupt files are treated as
    /// absent so a damaged checkpoint never blocks a new session.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.checkpoint_path.exists() {
            return Ok(None);
        }

        let content = fs_err::read_to_string(&self.checkpoint_path)
            .map_err(|err| WorklogError::io("Failed to read session checkpoint", err))?;
        if content.trim().is_empty() {
            tracing::warn!(
                path = %self.checkpoint_path.display(),
                "Session checkpoint is empty; ignoring"
            );
            return Ok(None);
        }

        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(
                    path = %self.checkpoint_path.display(),
                    error = %err,
                    "Session checkpoint is corrupt; ignoring"
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        write_json_atomic(&self.checkpoint_path, session)
    }

    pub fn clear(&self) -> Result<()> {
        match fs_err::remove_file(&self.checkpoint_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WorklogError::io("Failed to remove session checkpoint", err)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Archive
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn archive_path(&self, session_id: &str) -> PathBuf {
        self.archive_dir.join(format!("session_{session_id}.json"))
    }

    pub fn archive(&self, session: &Session) -> Result<PathBuf> {
        let path = self.archive_path(&session.session_id);
        write_json_atomic(&path, session)?;
        Ok(path)
    }

    pub fn load_archived(&self, session_id: &str) -> Result<Session> {
        let path = self.archive_path(session_id);
        if !path.exists() {
            return Err(WorklogError::SessionNotFound(session_id.to_string()));
        }
        let content = fs_err::read_to_string(&path)
            .map_err(|err| WorklogError::io("Failed to read archived session", err))?;
        serde_json::from_str(&content)
            .map_err(|err| WorklogError::json(format!("Corrupt archive {}", path.display()), err))
    }

    /// Archived sessions, newest first. Unreadable entries are skipped.
    pub fn list_archived(&self) -> Result<Vec<Session>> {
        if !self.archive_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs_err::read_dir(&self.archive_dir)
            .map_err(|err| WorklogError::io("Failed to list session archive", err))?;
        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_archive = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("session_") && name.ends_with(".json"));
            if !is_archive {
                continue;
            }
            let parsed = fs_err::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<Session>(&content).ok());
            match parsed {
                Some(session) => sessions.push(session),
                None => tracing::warn!(path = %path.display(), "Skipping unreadable archive"),
            }
        }
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }
}

pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|err| WorklogError::json("Failed to serialize JSON document", err))?;
    write_atomic(path, content.as_bytes())
}

/// Name prefix of in-flight atomic writes. Paired with a `.tmp` suffix so
/// the watcher's ignore set drops them.
pub const TEMP_FILE_PREFIX: &str = ".worklog-";

/// Replaces `path` in full: temp file in the same directory, then rename.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(dir)
        .map_err(|err| WorklogError::io(format!("Failed to create {}", dir.display()), err))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|err| WorklogError::io("Failed to create temp file", err))?;
    tmp.write_all(content)
        .map_err(|err| WorklogError::io("Failed to write temp file", err))?;
    tmp.flush()
        .map_err(|err| WorklogError::io("Failed to flush temp file", err))?;
    tmp.persist(path)
        .map_err(|err| WorklogError::io("Failed to persist file", err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::LineDelta;
    use crate::session::ChangeType;
    use chrono::Utc;

    fn checkpoint(root: &Path) -> SessionCheckpoint {
        SessionCheckpoint::new(root.join("current_session.json"), root.join("archive"))
    }

    #[test]
    fn save_then_load_returns_same_session() {
        let temp = tempfile::tempdir().expect("temp dir");
        let checkpoint = checkpoint(temp.path());
        let mut session = Session::new(Path::new("/work/repo"), Utc::now());
        session
            .record_change("a.rs", ChangeType::Modified, LineDelta::new(1, 2), Utc::now())
            .expect("record");

        checkpoint.save(&session).expect("save");
        let loaded = checkpoint.load().expect("load").expect("present");
        assert_eq!(loaded, session);
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let temp = tempfile::tempdir().expect("temp dir");
        assert!(checkpoint(temp.path()).load().expect("load").is_none());
    }

    #[test]
    fn corrupt_checkpoint_is_treated_as_absent() {
        let temp = tempfile::tempdir().expect("temp dir");
        let checkpoint = checkpoint(temp.path());
        fs_err::write(checkpoint.path(), "{\"session_id\": ").expect("write");
        assert!(checkpoint.load().expect("load").is_none());

        fs_err::write(checkpoint.path(), "   ").expect("write");
        assert!(checkpoint.load().expect("load").is_none());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let temp = tempfile::tempdir().expect("temp dir");
        let checkpoint = checkpoint(temp.path());
        let session = Session::new(Path::new("/work/repo"), Utc::now());
        checkpoint.save(&session).expect("save");
        checkpoint.save(&session).expect("save again");

        let names: Vec<_> = fs_err::read_dir(temp.path())
            .expect("read dir")
            .flatten()
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("current_session.json")]);
    }

    #[test]
    fn archive_round_trip_and_listing() {
        let temp = tempfile::tempdir().expect("temp dir");
        let checkpoint = checkpoint(temp.path());
        let older = Session::with_id(
            "older",
            Path::new("/work/repo"),
            Utc::now() - chrono::Duration::hours(1),
        );
        let newer = Session::with_id("newer", Path::new("/work/repo"), Utc::now());
        checkpoint.archive(&older).expect("archive older");
        checkpoint.archive(&newer).expect("archive newer");

        let loaded = checkpoint.load_archived("older").expect("load");
        assert_eq!(loaded.session_id, "older");

        let ids: Vec<_> = checkpoint
            .list_archived()
            .expect("list")
            .into_iter()
            .map(|session| session.session_id)
            .collect();
        assert_eq!(ids, vec!["newer".to_string(), "older".to_string()]);
    }

    #[test]
    fn unknown_archive_is_not_found() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = checkpoint(temp.path())
            .load_archived("missing")
            .expect_err("missing");
        assert!(matches!(err, WorklogError::SessionNotFound(_)));
    }

    #[test]
    fn clear_is_idempotent() {
        let temp = tempfile::tempdir().expect("temp dir");
        let checkpoint = checkpoint(temp.path());
        checkpoint.clear().expect("clear missing");
        checkpoint
            .save(&Session::new(Path::new("/r"), Utc::now()))
            .expect("save");
        checkpoint.clear().expect("clear");
        assert!(!checkpoint.path().exists());
    }
}
