use clap::Args;
use std::path::PathBuf;

use worklog_core::annotations::{self, Annotations};
use worklog_core::{Result, WorklogError};

use super::{resolve_repo, Context};

#[derive(Args)]
pub struct NoteArgs {
    #[arg(value_name = "REPO")]
    repo: Option<PathBuf>,

    /// What was done
    #[arg(long)]
    summary: Option<String>,

    #[arg(long)]
    problems: Option<String>,

    #[arg(long)]
    solutions: Option<String>,

    /// Summary of the assistant conversation, if any
    #[arg(long)]
    chat: Option<String>,

    /// Follow-up work
    #[arg(long = "next")]
    next_steps: Option<String>,
}

/// Merges the given fields into the pending notes for the next record.
pub fn run(args: NoteArgs) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(args.repo)?;
    ctx.storage.ensure_repo_dirs(&repo_root)?;

    let update = Annotations {
        work_summary: args.summary,
        problems: args.problems,
        solutions: args.solutions,
        chat_summary: args.chat,
        next_steps: args.next_steps,
    }
    .normalized();
    if update.is_empty() {
        return Err(WorklogError::InvalidInput(
            "Give at least one of --summary, --problems, --solutions, --chat, --next".to_string(),
        ));
    }

    let path = ctx.storage.annotations_file(&repo_root);
    let merged = annotations::load(&path)?.merged_with(update);
    annotations::save(&path, &merged)?;
    tracing::info!(path = %path.display(), "Saved session notes");
    println!("Notes saved; they attach to the next recorded session");
    Ok(())
}
