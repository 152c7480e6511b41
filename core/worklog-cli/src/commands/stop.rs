use std::path::PathBuf;

use worklog_core::{Result, WorklogError};

use super::{pid_alive, read_pid, resolve_repo, Context};

pub fn run(repo: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load()?;
    let repo_root = resolve_repo(repo)?;
    let pid_file = ctx.storage.pid_file(&repo_root);

    let Some(pid) = read_pid(&pid_file) else {
        println!("No watcher running for {}", repo_root.display());
        return Ok(());
    };

    if !pid_alive(pid) {
        tracing::info!(pid, path = %pid_file.display(), "Removing stale watcher pid file");
        let _ = fs_err::remove_file(&pid_file);
        println!("No watcher running for {}", repo_root.display());
        return Ok(());
    }

    // SAFETY: libc::kill with SIGTERM is a standard POSIX signal delivery.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(WorklogError::io(
            format!("Failed to signal watcher {pid}"),
            std::io::Error::last_os_error(),
        ));
    }

    tracing::info!(pid, "Sent SIGTERM to watcher");
    println!("Stopping watcher (pid {pid}); it records the session on exit");
    Ok(())
}
