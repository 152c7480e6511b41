//! Event coalescing and session aggregation.
//!
//! Raw filesystem events land in a pending buffer keyed by repository-relative
//! path. A burst for one path collapses to one entry holding the first change
//! type seen. Once the buffer has been quiet for the quiescence interval a
//! tick drains it: each path is classified, estimated once and folded into
//! the session.
//!
//! ```text
//! Idle ──start──▶ Active ──stop──▶ Draining ──final flush + finalize──▶ Closed
//! ```
//!
//! The aggregator is owned by a single consumer loop; callers feed it events
//! and ticks from one thread, so no internal locking is needed.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::classifier::Classifier;
use crate::docs_index::DocsIndexer;
use crate::error::{Result, WorklogError};
use crate::estimator::ChangeEstimator;
use crate::ignore::{relative_path, IgnoreSet};
use crate::session::{ChangeType, Session, SessionStats};
use crate::tracker::SessionTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Active,
    Draining,
    Closed,
}

impl AggregatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregatorState::Idle => "idle",
            AggregatorState::Active => "active",
            AggregatorState::Draining => "draining",
            AggregatorState::Closed => "closed",
        }
    }
}

/// One raw notification from the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: ChangeType,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeType) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingChange {
    change_type: ChangeType,
    last_seen: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
    pub docs_regenerated: bool,
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub quiescence: Duration,
    pub docs_dir: String,
    pub ignore: IgnoreSet,
    pub classifier: Classifier,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(1000),
            docs_dir: "docs".to_string(),
            ignore: IgnoreSet::new(Some("docs/INDEX.md"), &[]),
            classifier: Classifier::new(),
        }
    }
}

pub struct Aggregator<E, I> {
    state: AggregatorState,
    tracker: SessionTracker,
    estimator: E,
    indexer: I,
    options: AggregatorOptions,
    pending: BTreeMap<String, PendingChange>,
    last_mutation: Option<Instant>,
}

impl<E: ChangeEstimator, I: DocsIndexer> Aggregator<E, I> {
    pub fn new(tracker: SessionTracker, estimator: E, indexer: I, options: AggregatorOptions) -> Self {
        Self {
            state: AggregatorState::Idle,
            tracker,
            estimator,
            indexer,
            options,
            pending: BTreeMap::new(),
            last_mutation: None,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn repo_root(&self) -> &Path {
        self.tracker.repo_root()
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn session(&self) -> Option<&Session> {
        self.tracker.current()
    }

    pub fn stats(&self) -> Option<SessionStats> {
        self.tracker.stats(Utc::now())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Opens (or resumes) the session and begins accepting events.
    pub fn start(&mut self) -> Result<&Session> {
        match self.state {
            AggregatorState::Idle | AggregatorState::Active => {
                self.state = AggregatorState::Active;
                self.tracker.start(Utc::now())
            }
            AggregatorState::Draining | AggregatorState::Closed => Err(WorklogError::InvalidInput(
                format!("Aggregator is {}", self.state.as_str()),
            )),
        }
    }

    /// Buffers one raw event. Returns false when the event was filtered out
    /// or the aggregator is not accepting events.
    pub fn observe(&mut self, event: RawEvent, now: Instant) -> bool {
        if self.state != AggregatorState::Active {
            return false;
        }
        self.buffer(event, now)
    }

    fn buffer(&mut self, event: RawEvent, now: Instant) -> bool {
        let Some(rel) = relative_path(self.tracker.repo_root(), &event.path) else {
            return false;
        };
        if self.options.ignore.is_ignored(&rel) || event.path.is_dir() {
            return false;
        }

        self.pending
            .entry(rel)
            .and_modify(|pending| pending.last_seen = now)
            .or_insert(PendingChange {
                change_type: event.kind,
                last_seen: now,
            });
        self.last_mutation = Some(now);
        true
    }

    /// Periodic flush check. Drains only when the buffer is non-empty and has
    /// been quiet for the quiescence interval.
    pub fn tick(&mut self, now: Instant) -> Option<FlushReport> {
        if self.state != AggregatorState::Active || self.pending.is_empty() {
            return None;
        }
        let quiet = self
            .last_mutation
            .map(|last| now.saturating_duration_since(last) >= self.options.quiescence)
            .unwrap_or(true);
        if !quiet {
            return None;
        }
        Some(self.drain())
    }

    fn drain(&mut self) -> FlushReport {
        let batch = std::mem::take(&mut self.pending);
        self.last_mutation = None;

        let docs_prefix = format!("{}/", self.options.docs_dir.trim_end_matches('/'));
        let mut report = FlushReport::default();
        let mut docs_dirty = false;

        for (path, pending) in batch {
            let classification = self.options.classifier.classify(&path);
            let delta = self
                .estimator
                .estimate(&path, self.tracker.repo_root());
            match self
                .tracker
                .record_change(&path, pending.change_type, delta, Utc::now())
            {
                Ok(()) => {
                    tracing::debug!(
                        path = %path,
                        module = %classification.module,
                        language = classification.language,
                        change_type = pending.change_type.as_str(),
                        added = delta.added,
                        removed = delta.removed,
                        "Recorded file change"
                    );
                    report.flushed += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Failed to record file change");
                    report.failed += 1;
                }
            }
            if path.starts_with(&docs_prefix) {
                docs_dirty = true;
            }
        }

        if docs_dirty {
            match self.indexer.regenerate(self.tracker.repo_root()) {
                Ok(written) => report.docs_regenerated = written,
                Err(err) => tracing::warn!(error = %err, "Docs index regeneration failed"),
            }
        }

        tracing::info!(
            flushed = report.flushed,
            failed = report.failed,
            docs_regenerated = report.docs_regenerated,
            "Flushed pending changes"
        );
        report
    }

    /// Stops accepting new events, folds in events that were already queued,
    /// flushes regardless of quiescence and finalizes the session.
    ///
    /// Returns the finalized session the first time; later calls return
    /// `Ok(None)`. The aggregator is `Closed` afterwards even on error.
    pub fn stop<Q>(&mut self, queued: Q) -> Result<Option<Session>>
    where
        Q: IntoIterator<Item = RawEvent>,
    {
        match self.state {
            AggregatorState::Closed | AggregatorState::Draining => return Ok(None),
            AggregatorState::Idle => {
                self.state = AggregatorState::Closed;
                return Ok(None);
            }
            AggregatorState::Active => {}
        }

        self.state = AggregatorState::Draining;
        let now = Instant::now();
        for event in queued {
            self.buffer(event, now);
        }
        if !self.pending.is_empty() {
            self.drain();
        }

        let ended = self.tracker.end(Utc::now());
        self.state = AggregatorState::Closed;
        ended.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SessionCheckpoint;
    use crate::estimator::LineDelta;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FixedEstimator {
        calls: RefCell<Vec<String>>,
    }

    impl ChangeEstimator for FixedEstimator {
        fn estimate(&self, rel_path: &str, _repo_root: &Path) -> LineDelta {
            self.calls.borrow_mut().push(rel_path.to_string());
            LineDelta::new(2, 1)
        }
    }

    #[derive(Default)]
    struct CountingIndexer {
        runs: RefCell<usize>,
    }

    impl DocsIndexer for CountingIndexer {
        fn regenerate(&self, _repo_root: &Path) -> Result<bool> {
            *self.runs.borrow_mut() += 1;
            Ok(true)
        }
    }

    fn aggregator<'a>(
        data: &Path,
        repo: &Path,
        estimator: &'a FixedEstimator,
        indexer: &'a CountingIndexer,
    ) -> Aggregator<&'a FixedEstimator, &'a CountingIndexer> {
        let checkpoint =
            SessionCheckpoint::new(data.join("current_session.json"), data.join("archive"));
        let tracker = SessionTracker::resume_or_idle(repo, checkpoint).expect("tracker");
        Aggregator::new(tracker, estimator, indexer, AggregatorOptions::default())
    }

    #[test]
    fn events_before_start_are_rejected() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);

        assert_eq!(agg.state(), AggregatorState::Idle);
        let accepted = agg.observe(
            RawEvent::new(repo.path().join("a.txt"), ChangeType::Modified),
            Instant::now(),
        );
        assert!(!accepted);
        assert_eq!(agg.pending_len(), 0);
    }

    #[test]
    fn tick_waits_for_quiescence() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);
        agg.start().expect("start");

        let t0 = Instant::now();
        agg.observe(RawEvent::new(repo.path().join("a.txt"), ChangeType::Modified), t0);

        assert!(agg.tick(t0 + Duration::from_millis(500)).is_none());
        let report = agg.tick(t0 + Duration::from_millis(1000)).expect("flush");
        assert_eq!(report.flushed, 1);
        assert_eq!(agg.pending_len(), 0);
        assert!(agg.tick(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn filters_ignored_outside_and_directory_events() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        fs_err::create_dir_all(repo.path().join("src")).expect("src");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);
        agg.start().expect("start");

        let now = Instant::now();
        let root = repo.path();
        assert!(!agg.observe(RawEvent::new(root.join(".git/index"), ChangeType::Modified), now));
        assert!(!agg.observe(RawEvent::new(root.join("docs/INDEX.md"), ChangeType::Modified), now));
        assert!(!agg.observe(RawEvent::new(root.join("src"), ChangeType::Modified), now));
        assert!(!agg.observe(RawEvent::new("/elsewhere/file.rs", ChangeType::Modified), now));
        assert!(agg.observe(RawEvent::new(root.join("src/lib.rs"), ChangeType::Modified), now));
        assert_eq!(agg.pending_len(), 1);
    }

    #[test]
    fn docs_changes_trigger_one_regeneration_per_flush() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);
        agg.start().expect("start");

        let t0 = Instant::now();
        agg.observe(RawEvent::new(repo.path().join("docs/a.md"), ChangeType::Created), t0);
        agg.observe(RawEvent::new(repo.path().join("docs/b.md"), ChangeType::Created), t0);
        let report = agg.tick(t0 + Duration::from_secs(2)).expect("flush");
        assert!(report.docs_regenerated);
        assert_eq!(*indexer.runs.borrow(), 1);

        agg.observe(RawEvent::new(repo.path().join("src/main.rs"), ChangeType::Modified), t0);
        let report = agg.tick(t0 + Duration::from_secs(4)).expect("flush");
        assert!(!report.docs_regenerated);
        assert_eq!(*indexer.runs.borrow(), 1);
    }

    #[test]
    fn stop_flushes_queued_events_and_is_idempotent() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);
        agg.start().expect("start");

        let now = Instant::now();
        agg.observe(RawEvent::new(repo.path().join("a.rs"), ChangeType::Created), now);
        let queued = vec![RawEvent::new(repo.path().join("b.rs"), ChangeType::Modified)];

        let session = agg.stop(queued).expect("stop").expect("session");
        assert_eq!(agg.state(), AggregatorState::Closed);
        assert!(session.end_time.is_some());
        assert_eq!(session.file_changes.len(), 2);
        assert_eq!(session.file_changes["a.rs"].change_type, ChangeType::Created);

        assert!(agg.stop(Vec::new()).expect("second stop").is_none());
        assert!(!agg.observe(RawEvent::new(repo.path().join("c.rs"), ChangeType::Modified), now));
        assert!(agg.start().is_err());
    }

    #[test]
    fn stop_while_idle_closes_without_session() {
        let data = tempfile::tempdir().expect("data dir");
        let repo = tempfile::tempdir().expect("repo dir");
        let estimator = FixedEstimator::default();
        let indexer = CountingIndexer::default();
        let mut agg = aggregator(data.path(), repo.path(), &estimator, &indexer);
        assert!(agg.stop(Vec::new()).expect("stop").is_none());
        assert_eq!(agg.state(), AggregatorState::Closed);
    }
}
