//! Owner of the single active session for one repository.
//!
//! Every mutation is checkpointed before the call returns, so a crashed
//! watcher resumes exactly where it stopped.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::checkpoint::SessionCheckpoint;
use crate::error::{Result, WorklogError};
use crate::estimator::LineDelta;
use crate::session::{ChangeType, Session, SessionStats};

#[derive(Debug)]
pub struct SessionTracker {
    repo_root: PathBuf,
    checkpoint: SessionCheckpoint,
    session: Option<Session>,
}

impl SessionTracker {
    /// Resumes an interrupted session from the checkpoint, if any.
    ///
    /// A checkpoint that was already finalized (the process died between
    /// finalize and archive) is archived now and the tracker starts idle.
    pub fn resume_or_idle(repo_root: &Path, checkpoint: SessionCheckpoint) -> Result<Self> {
        let mut session = checkpoint.load()?;

        if let Some(stale) = session.as_ref().filter(|s| !s.is_active()) {
            tracing::info!(
                session_id = %stale.session_id,
                "Archiving finalized session left in checkpoint"
            );
            checkpoint.archive(stale)?;
            checkpoint.clear()?;
            session = None;
        }

        if let Some(resumed) = &session {
            tracing::info!(
                session_id = %resumed.session_id,
                files = resumed.file_changes.len(),
                "Resumed session from checkpoint"
            );
        }

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            checkpoint,
            session,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn checkpoint(&self) -> &SessionCheckpoint {
        &self.checkpoint
    }

    /// Starts a session, or returns the active one unchanged.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<&Session> {
        if self.session.is_none() {
            let session = Session::new(&self.repo_root, now);
            self.checkpoint.save(&session)?;
            tracing::info!(session_id = %session.session_id, "Session started");
            self.session = Some(session);
        }
        self.session.as_ref().ok_or(WorklogError::NoActiveSession)
    }

    pub fn record_change(
        &mut self,
        path: &str,
        change_type: ChangeType,
        delta: LineDelta,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session = self.session.as_mut().ok_or(WorklogError::NoActiveSession)?;
        session.record_change(path, change_type, delta, now)?;
        self.checkpoint.save(session)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let session = self.session.as_mut().ok_or(WorklogError::NoActiveSession)?;
        let changed = session.pause(now);
        if changed {
            self.checkpoint.save(session)?;
        }
        Ok(changed)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let session = self.session.as_mut().ok_or(WorklogError::NoActiveSession)?;
        let changed = session.resume(now);
        if changed {
            self.checkpoint.save(session)?;
        }
        Ok(changed)
    }

    /// Finalizes, archives and drops the working copy. Returns the finalized
    /// snapshot for the store writer.
    ///
    /// The in-memory session is dropped only once the archive is on disk; a
    /// failure part-way leaves a finalized checkpoint for the next resume.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<Session> {
        let mut session = self
            .session
            .clone()
            .ok_or(WorklogError::NoActiveSession)?;
        session.finalize(now)?;
        self.checkpoint.save(&session)?;
        let archived = self.checkpoint.archive(&session)?;
        self.checkpoint.clear()?;
        self.session = None;
        tracing::info!(
            session_id = %session.session_id,
            archive = %archived.display(),
            duration_secs = session.duration_at(now),
            "Session ended"
        );
        Ok(session)
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Option<SessionStats> {
        self.session.as_ref().map(|session| session.stats_at(now))
    }
}
