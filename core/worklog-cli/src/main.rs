//! worklog: records what you worked on, per repository.
//!
//! ## Subcommands
//!
//! - `watch`: Foreground watcher; Ctrl+C ends and records the session
//! - `stop` / `status` / `note` / `record`: Manage the active session
//! - `sessions`: Query recorded sessions
//! - `changelog`: Hand-authored change history
//! - `init` / `index`: Store and docs-index maintenance

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::changelog::ChangelogCommand;
use commands::note::NoteArgs;
use commands::sessions::SessionsCommand;
use commands::OutputFormat;
use worklog_core::StorageConfig;

#[derive(Parser)]
#[command(name = "worklog")]
#[command(about = "Developer work logger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store, or wipe it with --reset
    Init {
        /// Delete all recorded sessions and changelog entries
        #[arg(long)]
        reset: bool,

        /// Confirm a destructive reset
        #[arg(long)]
        yes: bool,
    },

    /// Watch a repository and record the session on exit
    Watch {
        /// Repository root (defaults to the current directory)
        #[arg(value_name = "REPO")]
        repo: Option<PathBuf>,
    },

    /// Ask the running watcher to end its session
    Stop {
        #[arg(value_name = "REPO")]
        repo: Option<PathBuf>,
    },

    /// Show the active session
    Status {
        #[arg(value_name = "REPO")]
        repo: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Attach notes to the next recorded session
    Note(NoteArgs),

    /// Retry storing an archived session; lists archives without an id
    Record {
        #[arg(value_name = "SESSION_ID")]
        session_id: Option<String>,

        /// Repository the session belongs to
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Query recorded sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,

        #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Manage the changelog
    Changelog {
        #[command(subcommand)]
        command: ChangelogCommand,
    },

    /// Regenerate the docs index once
    Index {
        #[arg(value_name = "REPO")]
        repo: Option<PathBuf>,
    },
}

fn main() {
    let logs_dir = StorageConfig::from_env()
        .ok()
        .map(|storage| storage.logs_dir());
    let _logging_guard = logging::init(logs_dir.as_deref());
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { reset, yes } => commands::init::run(reset, yes),
        Commands::Watch { repo } => commands::watch::run(repo),
        Commands::Stop { repo } => commands::stop::run(repo),
        Commands::Status { repo, format } => commands::status::run(repo, format),
        Commands::Note(args) => commands::note::run(args),
        Commands::Record { session_id, repo } => commands::record::run(session_id.as_deref(), repo),
        Commands::Sessions { command, format } => commands::sessions::run(command, format),
        Commands::Changelog { command } => commands::changelog::run(command),
        Commands::Index { repo } => commands::index::run(repo),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "worklog failed");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
