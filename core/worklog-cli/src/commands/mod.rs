pub mod changelog;
pub mod index;
pub mod init;
pub mod note;
pub mod record;
pub mod sessions;
pub mod status;
pub mod stop;
pub mod watch;

use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};

use worklog_core::changelog::escape_csv_field;
use worklog_core::config::load_config;
use worklog_core::storage::resolve_repo_root;
use worklog_core::{Db, Result, StorageConfig, WorklogConfig, WorklogError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

/// Storage paths plus the parsed `config.toml`.
pub struct Context {
    pub storage: StorageConfig,
    pub config: WorklogConfig,
}

impl Context {
    pub fn load() -> Result<Self> {
        let storage = StorageConfig::from_env()?;
        let config = load_config(&storage.config_file())?;
        Ok(Self { storage, config })
    }

    pub fn open_db(&self) -> Result<Db> {
        Db::new(self.storage.db_file())
    }
}

/// Canonical repository root; defaults to the current directory.
pub fn resolve_repo(repo: Option<PathBuf>) -> Result<PathBuf> {
    let path = match repo {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|err| WorklogError::io("Failed to read current directory", err))?,
    };
    resolve_repo_root(&path)
}

pub fn read_pid(path: &Path) -> Option<i32> {
    fs_err::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<i32>().ok())
        .filter(|pid| *pid > 0)
}

pub fn pid_alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks that the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| WorklogError::json("Failed to serialize output", err))?;
    println!("{text}");
    Ok(())
}

/// Prints rows as an aligned table, CSV or a Markdown table. JSON output is
/// handled by the caller, which has the typed records.
pub fn print_rows(format: OutputFormat, headers: &[&str], rows: &[Vec<String>]) {
    match format {
        OutputFormat::Csv => {
            println!("{}", headers.join(","));
            for row in rows {
                let cells: Vec<String> = row.iter().map(|cell| escape_csv_field(cell)).collect();
                println!("{}", cells.join(","));
            }
        }
        OutputFormat::Markdown => {
            println!("| {} |", headers.join(" | "));
            println!(
                "|{}|",
                headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
            );
            for row in rows {
                let cells: Vec<String> = row.iter().map(|cell| cell.replace('|', "\\|")).collect();
                println!("| {} |", cells.join(" | "));
            }
        }
        OutputFormat::Table | OutputFormat::Json => {
            let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
            for row in rows {
                for (idx, cell) in row.iter().enumerate() {
                    if let Some(width) = widths.get_mut(idx) {
                        *width = (*width).max(cell.chars().count());
                    }
                }
            }
            let line = |cells: Vec<&str>| {
                cells
                    .iter()
                    .zip(&widths)
                    .map(|(cell, &width)| format!("{cell:<width$}"))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            };
            println!("{}", line(headers.to_vec()));
            let rule_len = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
            println!("{}", "-".repeat(rule_len));
            for row in rows {
                println!("{}", line(row.iter().map(String::as_str).collect()));
            }
        }
    }
}

/// Shortens free text for a table cell.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let head: String = value.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}
