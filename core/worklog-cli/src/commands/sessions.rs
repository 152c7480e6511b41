use clap::Subcommand;

use worklog_core::query::{format_clock, DEFAULT_LIST_LIMIT};
use worklog_core::{Result, SessionQuery, SessionSummary, WorklogError};

use super::{print_json, print_rows, truncate, Context, OutputFormat};

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// Sessions from the last N days
    Recent {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Sessions that touched a module
    Module {
        name: String,

        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Keyword search over summaries, problems, solutions and next steps
    Search {
        keyword: String,

        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Full record of one session
    Show { session_id: String },

    /// Totals with a per-module breakdown
    Stats,

    /// Per-day summary
    Daily {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

pub fn run(command: SessionsCommand, format: OutputFormat) -> Result<()> {
    let ctx = Context::load()?;
    let db = ctx.open_db()?;
    let query = SessionQuery::new(&db);

    match command {
        SessionsCommand::Recent { days } => print_summaries(&query.recent(days)?, format),
        SessionsCommand::Module { name, limit } => {
            print_summaries(&query.by_module(&name, limit)?, format)
        }
        SessionsCommand::Search { keyword, limit } => {
            print_summaries(&query.search(&keyword, limit)?, format)
        }
        SessionsCommand::Show { session_id } => {
            let record = query
                .get(&session_id)?
                .ok_or_else(|| WorklogError::SessionNotFound(session_id.clone()))?;
            if format == OutputFormat::Json {
                return print_json(&record);
            }

            let notes = [
                ("summary", &record.work_summary),
                ("problems", &record.problems),
                ("solutions", &record.solutions),
                ("chat", &record.chat_summary),
                ("next steps", &record.next_steps),
            ];
            let mut rows = vec![
                vec!["session".to_string(), record.session_id.clone()],
                vec!["repo".to_string(), record.repo_path.clone()],
                vec!["start".to_string(), record.start_time.to_rfc3339()],
                vec!["end".to_string(), record.end_time.to_rfc3339()],
                vec!["duration".to_string(), format_clock(record.duration_seconds)],
                vec![
                    "primary module".to_string(),
                    record.primary_module.clone().unwrap_or_else(|| "-".to_string()),
                ],
                vec!["modules".to_string(), record.modules_touched.join(", ")],
            ];
            for (label, value) in notes {
                if let Some(text) = value {
                    rows.push(vec![label.to_string(), text.clone()]);
                }
            }
            print_rows(format, &["field", "value"], &rows);
            println!();

            let files: Vec<Vec<String>> = record
                .file_details
                .iter()
                .map(|detail| {
                    vec![
                        detail.file.clone(),
                        detail.module.clone(),
                        detail.language.clone(),
                        detail.change_type.as_str().to_string(),
                        format!("+{} -{}", detail.lines_added, detail.lines_deleted),
                        detail.magnitude.as_str().to_string(),
                    ]
                })
                .collect();
            print_rows(
                format,
                &["file", "module", "language", "change", "lines", "magnitude"],
                &files,
            );
            Ok(())
        }
        SessionsCommand::Stats => {
            let totals = query.stats()?;
            if format == OutputFormat::Json {
                return print_json(&totals);
            }
            let summary = vec![
                vec!["sessions".to_string(), totals.total_sessions.to_string()],
                vec!["time".to_string(), format_clock(totals.total_seconds)],
                vec!["files".to_string(), totals.total_files.to_string()],
                vec![
                    "lines".to_string(),
                    format!("+{} -{}", totals.total_added, totals.total_deleted),
                ],
                vec![
                    "range".to_string(),
                    format!(
                        "{} .. {}",
                        totals.first_session.as_deref().unwrap_or("-"),
                        totals.last_session.as_deref().unwrap_or("-")
                    ),
                ],
            ];
            print_rows(format, &["field", "value"], &summary);
            println!();

            let modules: Vec<Vec<String>> = totals
                .by_module
                .iter()
                .map(|row| {
                    vec![
                        row.module.clone(),
                        row.sessions.to_string(),
                        row.lines_added.to_string(),
                        row.lines_deleted.to_string(),
                    ]
                })
                .collect();
            print_rows(format, &["module", "sessions", "added", "deleted"], &modules);
            Ok(())
        }
        SessionsCommand::Daily { days } => {
            let daily = query.daily(days)?;
            if format == OutputFormat::Json {
                return print_json(&daily);
            }
            let rows: Vec<Vec<String>> = daily
                .iter()
                .map(|day| {
                    vec![
                        day.date.clone(),
                        day.sessions.to_string(),
                        format!("{:.1}", day.hours()),
                        day.files_changed.to_string(),
                        day.lines_added.to_string(),
                        day.modules.join(", "),
                    ]
                })
                .collect();
            print_rows(
                format,
                &["date", "sessions", "hours", "files", "added", "modules"],
                &rows,
            );
            Ok(())
        }
    }
}

fn print_summaries(summaries: &[SessionSummary], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(summaries);
    }
    if summaries.is_empty() && format == OutputFormat::Table {
        println!("No sessions found");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|summary| {
            vec![
                summary.date.clone(),
                summary.session_id.clone(),
                format_clock(summary.duration_seconds),
                summary.primary_module.clone().unwrap_or_else(|| "-".to_string()),
                summary.files_changed.to_string(),
                format!("+{} -{}", summary.lines_added, summary.lines_deleted),
                truncate(summary.work_summary.as_deref().unwrap_or(""), 40),
            ]
        })
        .collect();
    print_rows(
        format,
        &["date", "session", "duration", "module", "files", "lines", "summary"],
        &rows,
    );
    Ok(())
}
