//! Turns a finalized session plus annotations into one stored row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::annotations::{self, Annotations};
use crate::classifier::Classifier;
use crate::db::Db;
use crate::error::{Result, WorklogError};
use crate::estimator::{LineDelta, Magnitude};
use crate::session::{ChangeType, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    pub file: String,
    pub module: String,
    pub language: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub change_type: ChangeType,
    pub magnitude: Magnitude,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInference {
    pub primary_module: Option<String>,
    pub modules_touched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub session_id: String,
    pub repo_path: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub work_summary: Option<String>,
    pub problems: Option<String>,
    pub solutions: Option<String>,
    pub chat_summary: Option<String>,
    pub next_steps: Option<String>,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
    pub file_details: Vec<FileDetail>,
    pub primary_module: Option<String>,
    pub modules_touched: Vec<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Details must already be sorted by path. The primary module has the most
/// files; ties go to the module seen first in that order.
pub fn infer_modules(details: &[FileDetail]) -> ModuleInference {
    let mut touched: Vec<String> = Vec::new();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for detail in details {
        let count = counts.entry(detail.module.as_str()).or_insert(0);
        if *count == 0 {
            touched.push(detail.module.clone());
        }
        *count += 1;
    }

    let mut primary: Option<(&str, usize)> = None;
    for module in &touched {
        let count = counts.get(module.as_str()).copied().unwrap_or(0);
        if primary.map_or(true, |(_, best)| count > best) {
            primary = Some((module.as_str(), count));
        }
    }

    ModuleInference {
        primary_module: primary.map(|(module, _)| module.to_string()),
        modules_touched: touched,
    }
}

/// Builds the stored projection. Fails for a session that is still active.
pub fn build_record(
    session: &Session,
    annotations: &Annotations,
    classifier: &Classifier,
) -> Result<PersistedSession> {
    let end_time = session
        .end_time
        .ok_or_else(|| WorklogError::SessionNotFinalized {
            session_id: session.session_id.clone(),
        })?;

    // BTreeMap iteration is already sorted by path.
    let file_details: Vec<FileDetail> = session
        .file_changes
        .iter()
        .map(|(path, record)| {
            let classification = classifier.classify(path);
            FileDetail {
                file: path.clone(),
                module: classification.module,
                language: classification.language.to_string(),
                lines_added: record.lines_added,
                lines_deleted: record.lines_removed,
                change_type: record.change_type,
                magnitude: Magnitude::classify(LineDelta::new(
                    record.lines_added,
                    record.lines_removed,
                )),
            }
        })
        .collect();

    let inference = infer_modules(&file_details);
    let stats = session.stats_at(end_time);
    let notes = annotations.clone().normalized();

    Ok(PersistedSession {
        session_id: session.session_id.clone(),
        repo_path: session.repo_path.to_string_lossy().into_owned(),
        start_time: session.start_time,
        end_time,
        duration_seconds: stats.duration_secs,
        work_summary: notes.work_summary,
        problems: notes.problems,
        solutions: notes.solutions,
        chat_summary: notes.chat_summary,
        next_steps: notes.next_steps,
        files_changed: stats.files as i64,
        lines_added: stats.lines_added as i64,
        lines_deleted: stats.lines_removed as i64,
        file_details,
        primary_module: inference.primary_module,
        modules_touched: inference.modules_touched,
        recorded_at: None,
    })
}

pub struct SessionWriter<'a> {
    db: &'a Db,
    classifier: &'a Classifier,
}

impl<'a> SessionWriter<'a> {
    pub fn new(db: &'a Db, classifier: &'a Classifier) -> Self {
        Self { db, classifier }
    }

    /// Single insert. A second write of the same session fails with
    /// `AlreadyRecorded` and leaves the stored row as it was.
    pub fn write(&self, session: &Session, annotations: &Annotations) -> Result<PersistedSession> {
        let mut record = build_record(session, annotations, self.classifier)?;
        record.recorded_at = Some(Utc::now());
        self.db.insert_work_session(&record)?;
        tracing::info!(
            session_id = %record.session_id,
            files = record.files_changed,
            primary_module = record.primary_module.as_deref().unwrap_or("-"),
            "Session recorded"
        );
        Ok(record)
    }

    /// Writes with the annotations pending at `annotations_path`, consuming
    /// them only when the insert succeeded.
    pub fn write_with_pending(
        &self,
        session: &Session,
        annotations_path: &Path,
    ) -> Result<PersistedSession> {
        let pending = annotations::load(annotations_path)?;
        let record = self.write(session, &pending)?;
        if let Err(err) = annotations::consume(annotations_path) {
            tracing::warn!(
                path = %annotations_path.display(),
                error = %err,
                "Recorded session but could not remove annotations"
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn detail(file: &str, module: &str) -> FileDetail {
        FileDetail {
            file: file.to_string(),
            module: module.to_string(),
            language: "Rust".to_string(),
            lines_added: 1,
            lines_deleted: 0,
            change_type: ChangeType::Modified,
            magnitude: Magnitude::Low,
        }
    }

    #[test]
    fn primary_module_has_most_files() {
        let inference = infer_modules(&[
            detail("aoem/a.rs", "aoem-core"),
            detail("docs/a.md", "docs"),
            detail("docs/b.md", "docs"),
        ]);
        assert_eq!(inference.primary_module.as_deref(), Some("docs"));
        assert_eq!(inference.modules_touched, vec!["aoem-core", "docs"]);
    }

    #[test]
    fn primary_module_tie_goes_to_first_in_path_order() {
        let inference = infer_modules(&[
            detail("a/x.rs", "alpha"),
            detail("b/y.rs", "beta"),
            detail("c/z.rs", "alpha"),
            detail("d/w.rs", "beta"),
        ]);
        assert_eq!(inference.primary_module.as_deref(), Some("alpha"));
    }

    #[test]
    fn empty_session_has_no_primary_module() {
        let inference = infer_modules(&[]);
        assert!(inference.primary_module.is_none());
        assert!(inference.modules_touched.is_empty());
    }

    #[test]
    fn build_record_rejects_active_session() {
        let session = Session::new(Path::new("/work/repo"), Utc::now());
        let err = build_record(&session, &Annotations::default(), &Classifier::new())
            .expect_err("active");
        assert!(matches!(err, WorklogError::SessionNotFinalized { .. }));
    }

    #[test]
    fn build_record_aggregates_and_sorts() {
        let start = Utc::now() - Duration::minutes(10);
        let mut session = Session::with_id("s1", Path::new("/work/repo"), start);
        session
            .record_change("src/vm-runtime/b.rs", ChangeType::Modified, LineDelta::new(30, 25), start)
            .expect("b");
        session
            .record_change("docs/a.md", ChangeType::Created, LineDelta::new(4, 0), start)
            .expect("a");
        session.finalize(start + Duration::minutes(10)).expect("finalize");

        let notes = Annotations {
            work_summary: Some("Runtime cleanup".to_string()),
            problems: Some(" ".to_string()),
            ..Default::default()
        };
        let record = build_record(&session, &notes, &Classifier::new()).expect("record");

        assert_eq!(record.duration_seconds, 600);
        assert_eq!(record.files_changed, 2);
        assert_eq!(record.lines_added, 34);
        assert_eq!(record.lines_deleted, 25);
        assert_eq!(record.file_details[0].file, "docs/a.md");
        assert_eq!(record.file_details[1].magnitude, Magnitude::High);
        assert_eq!(record.primary_module.as_deref(), Some("docs"));
        assert_eq!(record.work_summary.as_deref(), Some("Runtime cleanup"));
        assert!(record.problems.is_none());
    }
}
