use dokan_db::{connect, migrations};

use crate::commands::{prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    CommandResult::from_step("migrate", migrate())
}

fn migrate() -> Result<String, StepFailure> {
    let (config, runtime) = prepare()?;

    let applied = runtime.block_on(async {
        let pool = connect(&config.database).await.map_err(StepFailure::db_connectivity)?;
        let applied = match migrations::run_pending(&pool).await {
            Ok(()) => migrations::applied_count(&pool).await.map_err(StepFailure::migration),
            Err(error) => Err(StepFailure::migration(error)),
        };
        pool.close().await;
        applied
    })?;

    Ok(format!(
        "schema up to date at `{}` ({applied} migration(s) applied)",
        config.database.url
    ))
}
