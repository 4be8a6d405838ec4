use dokan_db::{connect, migrations, DbPool, DemoSeedDataset, SeedResult};

use crate::commands::{prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    CommandResult::from_step("seed", seed())
}

fn seed() -> Result<String, StepFailure> {
    let (config, runtime) = prepare()?;

    let seeded = runtime.block_on(async {
        let pool = connect(&config.database).await.map_err(StepFailure::db_connectivity)?;
        let seeded = load_and_verify(&pool).await;
        pool.close().await;
        seeded
    })?;

    Ok(format!(
        "demo merchant `{}` seeded with {} catalog product(s)",
        seeded.merchant_id, seeded.products_seeded
    ))
}

async fn load_and_verify(pool: &DbPool) -> Result<SeedResult, StepFailure> {
    migrations::run_pending(pool).await.map_err(StepFailure::migration)?;

    let seeded = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| StepFailure::new("seed_execution", error.to_string(), 5))?;
    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| StepFailure::new("seed_verification", error.to_string(), 6))?;

    if !verification.all_present {
        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        return Err(StepFailure::new("seed_verification", verification_failure(&failed_checks), 6));
    }
    Ok(seeded)
}

fn verification_failure(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "demo data did not load completely".to_string()
    } else {
        format!("demo data missing after seed: {}", failed_checks.join(", "))
    }
}
