//! Session state: one work-tracking interval for one repository.
//!
//! A session is active until [`Session::finalize`] sets `end_time`. Per-file
//! deltas accumulate; the change type of a file is fixed by its first event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, WorklogError};
use crate::estimator::LineDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub change_type: ChangeType,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub first_seen: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub files: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub duration_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub repo_path: PathBuf,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pause_accumulated_secs: i64,
    #[serde(default)]
    pub file_changes: BTreeMap<String, FileChangeRecord>,
}

impl Session {
    pub fn new(repo_path: &Path, now: DateTime<Utc>) -> Self {
        Self::with_id(ulid::Ulid::new().to_string(), repo_path, now)
    }

    pub fn with_id(session_id: impl Into<String>, repo_path: &Path, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            repo_path: repo_path.to_path_buf(),
            start_time: now,
            end_time: None,
            paused: false,
            paused_at: None,
            pause_accumulated_secs: 0,
            file_changes: BTreeMap::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Folds one coalesced update for `path` into the session.
    pub fn record_change(
        &mut self,
        path: &str,
        change_type: ChangeType,
        delta: LineDelta,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.is_active() {
            return Err(WorklogError::SessionAlreadyFinalized {
                session_id: self.session_id.clone(),
            });
        }

        self.file_changes
            .entry(path.to_string())
            .and_modify(|record| {
                record.lines_added = record.lines_added.saturating_add(delta.added);
                record.lines_removed = record.lines_removed.saturating_add(delta.removed);
                record.last_modified = now;
            })
            .or_insert(FileChangeRecord {
                change_type,
                lines_added: delta.added,
                lines_removed: delta.removed,
                first_seen: now,
                last_modified: now,
            });
        Ok(())
    }

    /// Returns false when already paused or finalized.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.paused || !self.is_active() {
            return false;
        }
        self.paused = true;
        self.paused_at = Some(now);
        true
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.paused {
            return false;
        }
        if let Some(paused_at) = self.paused_at.take() {
            let paused_for = now.signed_duration_since(paused_at).num_seconds().max(0);
            self.pause_accumulated_secs = self.pause_accumulated_secs.saturating_add(paused_for);
        }
        self.paused = false;
        true
    }

    /// Seconds of tracked work, excluding completed and in-progress pauses.
    pub fn duration_at(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        let in_progress_pause = match (self.paused, self.paused_at) {
            (true, Some(paused_at)) => end.signed_duration_since(paused_at).num_seconds().max(0),
            _ => 0,
        };
        let elapsed = end.signed_duration_since(self.start_time).num_seconds();
        (elapsed - self.pause_accumulated_secs - in_progress_pause).max(0)
    }

    pub fn duration(&self) -> i64 {
        self.duration_at(Utc::now())
    }

    /// Sets `end_time`. A second call fails and leaves `end_time` untouched.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            return Err(WorklogError::SessionAlreadyFinalized {
                session_id: self.session_id.clone(),
            });
        }
        self.resume(now);
        self.end_time = Some(now);
        Ok(())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> SessionStats {
        let (lines_added, lines_removed) =
            self.file_changes
                .values()
                .fold((0u64, 0u64), |(added, removed), record| {
                    (
                        added.saturating_add(record.lines_added),
                        removed.saturating_add(record.lines_removed),
                    )
                });
        SessionStats {
            files: self.file_changes.len(),
            lines_added,
            lines_removed,
            duration_secs: self.duration_at(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn session() -> Session {
        Session::with_id("s1", Path::new("/work/repo"), t0())
    }

    #[test]
    fn repeated_changes_accumulate() {
        let mut session = session();
        session
            .record_change("a.rs", ChangeType::Modified, LineDelta::new(3, 1), t0())
            .expect("first");
        session
            .record_change(
                "a.rs",
                ChangeType::Modified,
                LineDelta::new(2, 4),
                t0() + Duration::seconds(10),
            )
            .expect("second");

        let record = &session.file_changes["a.rs"];
        assert_eq!(record.lines_added, 5);
        assert_eq!(record.lines_removed, 5);
        assert_eq!(record.first_seen, t0());
        assert_eq!(record.last_modified, t0() + Duration::seconds(10));
    }

    #[test]
    fn first_change_type_wins() {
        let mut session = session();
        session
            .record_change("new.rs", ChangeType::Created, LineDelta::ZERO, t0())
            .expect("create");
        session
            .record_change("new.rs", ChangeType::Deleted, LineDelta::ZERO, t0())
            .expect("delete");
        assert_eq!(session.file_changes["new.rs"].change_type, ChangeType::Created);
    }

    #[test]
    fn finalize_twice_keeps_first_end_time() {
        let mut session = session();
        let end = t0() + Duration::minutes(30);
        session.finalize(end).expect("finalize");

        let err = session
            .finalize(end + Duration::minutes(5))
            .expect_err("second finalize");
        assert!(matches!(err, WorklogError::SessionAlreadyFinalized { .. }));
        assert_eq!(session.end_time, Some(end));
        assert_eq!(session.duration_at(end + Duration::hours(3)), 1800);
    }

    #[test]
    fn finalized_session_rejects_changes() {
        let mut session = session();
        session.finalize(t0()).expect("finalize");
        let err = session
            .record_change("a.rs", ChangeType::Modified, LineDelta::ZERO, t0())
            .expect_err("closed");
        assert!(matches!(err, WorklogError::SessionAlreadyFinalized { .. }));
    }

    #[test]
    fn pause_excludes_paused_interval() {
        let mut session = session();
        assert!(session.pause(t0() + Duration::seconds(60)));
        assert!(!session.pause(t0() + Duration::seconds(70)));

        // While paused the duration stands still.
        assert_eq!(session.duration_at(t0() + Duration::seconds(60)), 60);
        assert_eq!(session.duration_at(t0() + Duration::seconds(90)), 60);

        assert!(session.resume(t0() + Duration::seconds(100)));
        assert_eq!(session.pause_accumulated_secs, 40);
        assert_eq!(session.duration_at(t0() + Duration::seconds(160)), 120);
    }

    #[test]
    fn finalize_while_paused_folds_pause() {
        let mut session = session();
        session.pause(t0() + Duration::seconds(30));
        session
            .finalize(t0() + Duration::seconds(90))
            .expect("finalize");
        assert!(!session.paused);
        assert_eq!(session.duration_at(t0() + Duration::hours(1)), 30);
    }

    #[test]
    fn duration_never_negative() {
        let session = session();
        assert_eq!(session.duration_at(t0() - Duration::minutes(5)), 0);
    }

    #[test]
    fn stats_sum_every_file() {
        let mut session = session();
        session
            .record_change("a.rs", ChangeType::Modified, LineDelta::new(3, 1), t0())
            .expect("a");
        session
            .record_change("b.rs", ChangeType::Created, LineDelta::new(10, 0), t0())
            .expect("b");

        let stats = session.stats_at(t0() + Duration::seconds(42));
        assert_eq!(stats.files, 2);
        assert_eq!(stats.lines_added, 13);
        assert_eq!(stats.lines_removed, 1);
        assert_eq!(stats.duration_secs, 42);
    }

    #[test]
    fn serializes_change_type_lowercase() {
        let mut session = session();
        session
            .record_change("a.rs", ChangeType::Created, LineDelta::ZERO, t0())
            .expect("a");
        let json = serde_json::to_string(&session).expect("serialize");
        assert!(json.contains("\"change_type\":\"created\""));
        let back: Session = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, session);
    }
}
