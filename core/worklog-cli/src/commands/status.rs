use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

use worklog_core::query::format_duration;
use worklog_core::{Result, SessionCheckpoint, SessionStats};

use super::{pid_alive, print_json, print_rows, read_pid, resolve_repo, Context, OutputFormat};

#[derive(Serialize)]
struct StatusView {
    repo: String,
    watcher_pid: Option<i32>,
    session_id: String,
    start_time: String,
    paused: bool,
    #[serde(flatten)]
    stats: SessionStats,
}

pub fn run(repo: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(repo)?;
    let checkpoint = SessionCheckpoint::for_repo(&ctx.storage, &repo_root);
    let watcher_pid = read_pid(&ctx.storage.pid_file(&repo_root)).filter(|pid| pid_alive(*pid));

    let Some(session) = checkpoint.load()?.filter(|session| session.is_active()) else {
        match format {
            OutputFormat::Json => print_json(&serde_json::Value::Null)?,
            _ => println!("No active session for {}", repo_root.display()),
        }
        return Ok(());
    };

    let view = StatusView {
        repo: repo_root.display().to_string(),
        watcher_pid,
        session_id: session.session_id.clone(),
        start_time: session.start_time.to_rfc3339(),
        paused: session.paused,
        stats: session.stats_at(Utc::now()),
    };

    if format == OutputFormat::Json {
        return print_json(&view);
    }

    let rows = vec![
        vec!["repo".to_string(), view.repo.clone()],
        vec![
            "watcher".to_string(),
            view.watcher_pid
                .map(|pid| format!("running (pid {pid})"))
                .unwrap_or_else(|| "not running".to_string()),
        ],
        vec!["session".to_string(), view.session_id.clone()],
        vec!["started".to_string(), view.start_time.clone()],
        vec!["duration".to_string(), format_duration(view.stats.duration_secs)],
        vec!["files".to_string(), view.stats.files.to_string()],
        vec![
            "lines".to_string(),
            format!("+{} -{}", view.stats.lines_added, view.stats.lines_removed),
        ],
        vec!["paused".to_string(), view.paused.to_string()],
    ];
    print_rows(format, &["field", "value"], &rows);
    Ok(())
}
