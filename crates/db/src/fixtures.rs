use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const DEMO_MERCHANT_ID: &str = "demo-page";

const DEMO_PRODUCT_IDS: &[&str] = &[
    "demo-cotton-saree",
    "demo-jamdani-saree",
    "demo-silk-scarf",
    "demo-product-a",
    "demo-product-a-pro",
];

/// Demo merchant with a small catalog: one sold-out product, one with scarce stock and a
/// pair of names where one contains the other.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loading twice leaves the same rows; stock levels are reset to their seeded values.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            merchant_id: DEMO_MERCHANT_ID,
            products_seeded: DEMO_PRODUCT_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let merchant_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM merchant WHERE id = ?1)")
                .bind(DEMO_MERCHANT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("demo-merchant", merchant_exists == 1));

        for product_id in DEMO_PRODUCT_IDS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM catalog_product WHERE id = ?1 AND merchant_id = ?2)",
            )
            .bind(product_id)
            .bind(DEMO_MERCHANT_ID)
            .fetch_one(pool)
            .await?;
            checks.push((*product_id, exists == 1));
        }

        let sold_out_consistent: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM catalog_product WHERE merchant_id = ?1 AND stock = 0 AND in_stock = 1",
        )
        .bind(DEMO_MERCHANT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("zero-stock-is-out-of-stock", sold_out_consistent == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub merchant_id: &'static str,
    pub products_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
