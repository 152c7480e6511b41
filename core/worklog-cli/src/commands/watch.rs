//! Foreground watcher.
//!
//! Three producers feed one bounded channel: the OS file watcher, a flush
//! ticker and the termination-signal listener. The consumer loop below is
//! the only owner of the aggregator.
//!
//! ```text
//! notify ──Fs──┐
//! ticker ──Tick┼──▶ channel ──▶ Aggregator ──stop──▶ SessionWriter
//! signals ─Stop┘
//! ```

use crossbeam::channel::{self, Receiver, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use worklog_core::query::format_duration;
use worklog_core::{
    Aggregator, AggregatorOptions, ChangeType, Classifier, DisabledIndex, DocsIndex, DocsIndexer,
    GitDiffEstimator, IgnoreSet, RawEvent, Result, Session, SessionCheckpoint, SessionTracker,
    SessionWriter, WorklogError,
};

use super::{pid_alive, read_pid, resolve_repo, Context};

enum WatchMessage {
    Fs(RawEvent),
    Tick,
    Stop,
}

pub fn run(repo: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(repo)?;
    ctx.storage.ensure_repo_dirs(&repo_root)?;

    let pid_file = ctx.storage.pid_file(&repo_root);
    if let Some(pid) = read_pid(&pid_file).filter(|pid| pid_alive(*pid)) {
        return Err(WorklogError::InvalidInput(format!(
            "A watcher is already running for {} (pid {pid})",
            repo_root.display()
        )));
    }
    fs_err::write(&pid_file, std::process::id().to_string())
        .map_err(|err| WorklogError::io("Failed to write watcher pid file", err))?;

    let result = watch(&ctx, &repo_root);

    if let Err(err) = fs_err::remove_file(&pid_file) {
        tracing::debug!(path = %pid_file.display(), error = %err, "Unable to remove pid file");
    }
    result
}

fn watch(ctx: &Context, repo_root: &Path) -> Result<()> {
    let config = &ctx.config;
    let classifier = Classifier::with_rules(&config.modules)?;

    let mut ignore = IgnoreSet::new(Some(&config.docs.index_file), &config.watch.extra_ignore);
    // Keep the store out of the session when it lives inside the repository.
    if let Some(rel) = worklog_core::ignore::relative_path(repo_root, ctx.storage.root()) {
        ignore.add(&format!("{rel}/"));
    }

    let indexer: Box<dyn DocsIndexer> = if config.docs.enabled {
        Box::new(DocsIndex::from_config(&config.docs, &config.watch.extra_ignore))
    } else {
        Box::new(DisabledIndex)
    };

    let tracker = SessionTracker::resume_or_idle(
        repo_root,
        SessionCheckpoint::for_repo(&ctx.storage, repo_root),
    )?;
    let mut aggregator = Aggregator::new(
        tracker,
        GitDiffEstimator::from_config(&config.estimator),
        indexer,
        AggregatorOptions {
            quiescence: config.watch.quiescence(),
            docs_dir: config.docs.dir.clone(),
            ignore,
            classifier: classifier.clone(),
        },
    );

    let session_id = aggregator.start()?.session_id.clone();
    println!("Watching {} (session {session_id})", repo_root.display());
    println!("Press Ctrl+C or run `worklog stop` to end the session");

    let (tx, rx) = channel::bounded(config.watch.channel_capacity.max(1));
    let watcher = start_fs_watcher(repo_root, tx.clone())?;
    spawn_ticker(tx.clone(), config.watch.flush_interval());
    spawn_signal_listener(tx)?;

    consume(&mut aggregator, &rx);

    // No new filesystem events past this point; fold in whatever is queued.
    drop(watcher);
    let queued: Vec<RawEvent> = rx
        .try_iter()
        .filter_map(|message| match message {
            WatchMessage::Fs(event) => Some(event),
            WatchMessage::Tick | WatchMessage::Stop => None,
        })
        .collect();

    let Some(session) = aggregator.stop(queued)? else {
        println!("No active session to record");
        return Ok(());
    };
    print_summary(&session);

    let db = ctx.open_db()?;
    let annotations_path = ctx.storage.annotations_file(repo_root);
    match SessionWriter::new(&db, &classifier).write_with_pending(&session, &annotations_path) {
        Ok(record) => {
            println!(
                "Recorded session {} (primary module: {})",
                record.session_id,
                record.primary_module.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(
                session_id = %session.session_id,
                error = %err,
                integrity = err.is_integrity(),
                "Failed to record session"
            );
            eprintln!("{}", record_failure_hint(&err, &session.session_id));
            Err(err)
        }
    }
}

fn record_failure_hint(err: &WorklogError, session_id: &str) -> String {
    if err.is_integrity() {
        format!("Session {session_id} is already in the store; archived snapshot kept, nothing to retry")
    } else {
        format!("Session archived but not recorded. Retry with: worklog record {session_id}")
    }
}

fn consume<E, I>(aggregator: &mut Aggregator<E, I>, rx: &Receiver<WatchMessage>)
where
    E: worklog_core::ChangeEstimator,
    I: DocsIndexer,
{
    loop {
        match rx.recv() {
            Ok(WatchMessage::Fs(event)) => {
                aggregator.observe(event, Instant::now());
            }
            Ok(WatchMessage::Tick) => {
                if let Some(report) = aggregator.tick(Instant::now()) {
                    if let Some(stats) = aggregator.stats() {
                        tracing::debug!(
                            flushed = report.flushed,
                            files = stats.files,
                            added = stats.lines_added,
                            removed = stats.lines_removed,
                            "Session updated"
                        );
                    }
                }
            }
            Ok(WatchMessage::Stop) | Err(_) => {
                tracing::info!("Stopping watcher");
                return;
            }
        }
    }
}

fn start_fs_watcher(repo_root: &Path, tx: Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let Some(kind) = change_type(&event.kind) else {
                return;
            };
            for path in event.paths {
                // Blocks when the consumer falls behind.
                if tx.send(WatchMessage::Fs(RawEvent::new(path, kind))).is_err() {
                    return;
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "File watcher error"),
    })
    .map_err(|err| WorklogError::io("Failed to create file watcher", std::io::Error::other(err)))?;

    watcher
        .watch(repo_root, RecursiveMode::Recursive)
        .map_err(|err| {
            WorklogError::io(
                format!("Failed to watch {}", repo_root.display()),
                std::io::Error::other(err),
            )
        })?;
    Ok(watcher)
}

fn change_type(kind: &EventKind) -> Option<ChangeType> {
    match kind {
        EventKind::Create(_) => Some(ChangeType::Created),
        EventKind::Modify(_) => Some(ChangeType::Modified),
        EventKind::Remove(_) => Some(ChangeType::Deleted),
        _ => None,
    }
}

fn spawn_ticker(tx: Sender<WatchMessage>, interval: Duration) {
    thread::spawn(move || loop {
        thread::sleep(interval);
        if tx.send(WatchMessage::Tick).is_err() {
            return;
        }
    });
}

fn spawn_signal_listener(tx: Sender<WatchMessage>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|err| WorklogError::io("Failed to install signal handlers", err))?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::info!(signal, "Termination signal received");
            let _ = tx.send(WatchMessage::Stop);
        }
    });
    Ok(())
}

fn print_summary(session: &Session) {
    let stats = session.stats_at(session.end_time.unwrap_or_else(chrono::Utc::now));
    println!();
    println!("Session {} ended", session.session_id);
    println!("  duration: {}", format_duration(stats.duration_secs));
    println!("  files:    {}", stats.files);
    println!("  lines:    +{} -{}", stats.lines_added, stats.lines_removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use worklog_core::config::IndexScope;

    #[test]
    fn notify_kinds_map_to_change_types() {
        assert_eq!(
            change_type(&EventKind::Create(CreateKind::File)),
            Some(ChangeType::Created)
        );
        assert_eq!(
            change_type(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeType::Modified)
        );
        assert_eq!(
            change_type(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeType::Deleted)
        );
        assert_eq!(change_type(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn consumer_exits_on_stop_and_leaves_queued_events() {
        let (tx, rx) = channel::bounded(8);
        tx.send(WatchMessage::Stop).expect("stop");
        tx.send(WatchMessage::Fs(RawEvent::new("/repo/a.rs", ChangeType::Modified)))
            .expect("event");

        let home = tempfile::tempdir().expect("home");
        let repo = tempfile::tempdir().expect("repo");
        let checkpoint = SessionCheckpoint::new(
            home.path().join("current_session.json"),
            home.path().join("archive"),
        );
        let tracker = SessionTracker::resume_or_idle(repo.path(), checkpoint).expect("tracker");
        let mut aggregator = Aggregator::new(
            tracker,
            GitDiffEstimator::default(),
            DisabledIndex,
            AggregatorOptions::default(),
        );
        aggregator.start().expect("start");

        consume(&mut aggregator, &rx);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn retry_hint_depends_on_failure_kind() {
        let duplicate = WorklogError::AlreadyRecorded {
            session_id: "s1".to_string(),
        };
        assert!(record_failure_hint(&duplicate, "s1").contains("nothing to retry"));

        let unavailable = WorklogError::io("open store", std::io::Error::other("locked"));
        assert!(record_failure_hint(&unavailable, "s1").ends_with("worklog record s1"));
    }

    #[test]
    fn docs_index_rewrite_produces_no_session_events() {
        let temp = tempfile::tempdir().expect("repo");
        let root = fs_err::canonicalize(temp.path()).expect("canonical root");
        fs_err::create_dir_all(root.join("docs")).expect("docs");
        fs_err::write(root.join("docs/guide.md"), "# Guide\n").expect("guide");

        let (tx, rx) = channel::bounded(256);
        let watcher = start_fs_watcher(&root, tx).expect("watcher");
        thread::sleep(Duration::from_millis(200));

        let index = DocsIndex::new("docs/INDEX.md", "docs", IndexScope::Docs);
        assert!(index.regenerate(&root).expect("regenerate"));
        thread::sleep(Duration::from_millis(500));
        drop(watcher);

        let ignore = IgnoreSet::new(Some("docs/INDEX.md"), &[]);
        let leaked: Vec<String> = rx
            .try_iter()
            .filter_map(|message| match message {
                WatchMessage::Fs(event) => worklog_core::ignore::relative_path(&root, &event.path),
                WatchMessage::Tick | WatchMessage::Stop => None,
            })
            .filter(|rel| !ignore.is_ignored(rel))
            .collect();
        assert!(leaked.is_empty(), "unexpected events: {leaked:?}");
    }
}
