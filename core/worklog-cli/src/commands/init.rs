use worklog_core::{Db, Result, WorklogError};

use super::Context;

pub fn run(reset: bool, yes: bool) -> Result<()> {
    let ctx = Context::load()?;
    let db_path = ctx.storage.db_file();

    if reset {
        if !yes {
            return Err(WorklogError::InvalidInput(
                "--reset deletes every recorded session; pass --yes to confirm".to_string(),
            ));
        }
        Db::reset(db_path.clone())?;
        tracing::warn!(path = %db_path.display(), "Store reset");
        println!("Reset store at {}", db_path.display());
        return Ok(());
    }

    let db = Db::new(db_path)?;
    println!("Store ready at {}", db.path().display());
    Ok(())
}
