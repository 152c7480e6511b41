use std::path::PathBuf;

use worklog_core::{DocsIndex, DocsIndexer, Result};

use super::{resolve_repo, Context};

pub fn run(repo: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(repo)?;
    let index = DocsIndex::from_config(&ctx.config.docs, &ctx.config.watch.extra_ignore);

    if index.regenerate(&repo_root)? {
        println!("Updated {}", index.index_path(&repo_root).display());
    } else {
        println!("{} is up to date", index.index_path(&repo_root).display());
    }
    Ok(())
}
