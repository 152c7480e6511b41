//! # worklog-core
//!
//! Core library for worklog, a developer work logger. A filesystem watcher
//! feeds raw change events into the [`Aggregator`], which folds them into one
//! [`Session`] per repository; a finished session is written once to the
//! SQLite store alongside a hand-authored changelog.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The watcher drives the aggregator from
//!   a single consumer thread.
//! - **Crash-safe sessions**: Every session mutation is checkpointed with an
//!   atomic write before the call returns.
//! - **Graceful degradation**: Estimation and docs-index failures are logged
//!   and absorbed; they never abort a session.
//! - **Write-once records**: A session id is stored at most once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use worklog_core::{Db, SessionQuery, StorageConfig};
//!
//! let storage = StorageConfig::from_env()?;
//! let db = Db::new(storage.db_file())?;
//! let recent = SessionQuery::new(&db).recent(7)?;
//! ```

pub mod aggregator;
pub mod annotations;
pub mod changelog;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod db;
pub mod docs_index;
pub mod error;
pub mod estimator;
pub mod ignore;
pub mod query;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod writer;

pub use aggregator::{Aggregator, AggregatorOptions, AggregatorState, FlushReport, RawEvent};
pub use annotations::Annotations;
pub use changelog::{
    ChangelogEntry, ChangelogFilter, ChangelogStats, ExportFormat, ModuleRegistration,
    PropertyRegistration,
};
pub use checkpoint::SessionCheckpoint;
pub use classifier::{Classification, Classifier, ModuleRule};
pub use config::{load_config, WorklogConfig};
pub use db::Db;
pub use docs_index::{DisabledIndex, DocsIndex, DocsIndexer};
pub use error::{Result, WorklogError};
pub use estimator::{ChangeEstimator, GitDiffEstimator, LineDelta, Magnitude};
pub use ignore::IgnoreSet;
pub use query::{DailySummary, SessionQuery, SessionSummary, SessionTotals};
pub use session::{ChangeType, Session, SessionStats};
pub use storage::StorageConfig;
pub use tracker::SessionTracker;
pub use writer::{FileDetail, PersistedSession, SessionWriter};
