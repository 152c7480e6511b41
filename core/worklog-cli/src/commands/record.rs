use std::path::PathBuf;

use worklog_core::query::format_clock;
use worklog_core::{Classifier, Db, Result, SessionCheckpoint, SessionWriter};

use super::{print_rows, resolve_repo, Context, OutputFormat};

/// Re-submits an archived session, e.g. after the store was unavailable when
/// the watcher exited. Without an id, lists the archive.
pub fn run(session_id: Option<&str>, repo: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(repo)?;
    let checkpoint = SessionCheckpoint::for_repo(&ctx.storage, &repo_root);
    let db = ctx.open_db()?;

    let Some(session_id) = session_id else {
        return list_archive(&checkpoint, &db);
    };
    let session = checkpoint.load_archived(session_id)?;

    let classifier = Classifier::with_rules(&ctx.config.modules)?;
    let record = SessionWriter::new(&db, &classifier)
        .write_with_pending(&session, &ctx.storage.annotations_file(&repo_root))?;

    println!(
        "Recorded {} ({} files, +{} -{})",
        record.session_id, record.files_changed, record.lines_added, record.lines_deleted
    );
    Ok(())
}

fn list_archive(checkpoint: &SessionCheckpoint, db: &Db) -> Result<()> {
    let archived = checkpoint.list_archived()?;
    if archived.is_empty() {
        println!("No archived sessions");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(archived.len());
    for session in &archived {
        let recorded = db.get_work_session(&session.session_id)?.is_some();
        rows.push(vec![
            session.session_id.clone(),
            session.start_time.format("%Y-%m-%d %H:%M").to_string(),
            format_clock(session.duration()),
            session.file_changes.len().to_string(),
            if recorded { "yes" } else { "no" }.to_string(),
        ]);
    }
    print_rows(
        OutputFormat::Table,
        &["session", "started", "duration", "files", "recorded"],
        &rows,
    );
    Ok(())
}
