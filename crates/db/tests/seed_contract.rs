use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use dokan_core::domain::conversation::MerchantId;
use dokan_db::repositories::{
    CatalogRepository, MerchantRepository, SqlCatalogRepository, SqlMerchantRepository,
};
use dokan_db::{connect_with_settings, migrations, DemoSeedDataset};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct MerchantContract {
    id: String,
    business_name: String,
    business_phone: String,
    subscription_active: bool,
}

#[derive(Debug, Deserialize)]
struct ProductContract {
    id: String,
    name: String,
    price: String,
    stock: u32,
    in_stock: bool,
}

#[derive(Debug, Deserialize)]
struct SeedContract {
    dataset_version: String,
    merchant: MerchantContract,
    products: Vec<ProductContract>,
}

fn load_contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_seed_contract.json"))
        .map_err(|error| format!("seed contract JSON must parse: {error}"))
}

#[test]
fn seed_contract_matches_demo_seed_sql_fixture() -> SeedContractTestResult {
    let fixture_sql = DemoSeedDataset::SQL;
    let contract = load_contract()?;
    let mut ids_seen = HashSet::new();

    require!(!contract.dataset_version.is_empty());
    require!(
        fixture_sql.contains(&format!("'{}'", contract.merchant.id)),
        "seed SQL should include merchant id {}",
        contract.merchant.id
    );
    require!(fixture_sql.contains(&format!("'{}'", contract.merchant.business_name)));

    for product in &contract.products {
        require!(ids_seen.insert(product.id.clone()), "duplicate product id: {}", product.id);
        require!(
            fixture_sql.contains(&format!("'{}', '{}'", product.id, contract.merchant.id)),
            "seed SQL should include product {} for the demo merchant",
            product.id
        );
        require!(
            fixture_sql.contains(&format!("'{}'", product.name)),
            "seed SQL should include product name {}",
            product.name
        );
        require!(
            product.stock > 0 || !product.in_stock,
            "product {} has zero stock but is marked in stock",
            product.id
        );
    }

    Ok(())
}

#[tokio::test]
async fn seeded_database_matches_contract() -> SeedContractTestResult {
    let contract = load_contract()?;
    let pool =
        connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|error| error.to_string())?;
    migrations::run_pending(&pool).await.map_err(|error| error.to_string())?;
    DemoSeedDataset::load(&pool).await.map_err(|error| error.to_string())?;

    let merchant_id = MerchantId(contract.merchant.id.clone());
    let merchant = SqlMerchantRepository::new(pool.clone())
        .find_by_id(&merchant_id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or_else(|| "demo merchant should be seeded".to_string())?;

    require_eq!(merchant.business_name, contract.merchant.business_name);
    require_eq!(merchant.business_phone.as_deref(), Some(contract.merchant.business_phone.as_str()));
    require_eq!(merchant.subscription_active, contract.merchant.subscription_active);

    let products = SqlCatalogRepository::new(pool)
        .list_for_merchant(&merchant_id)
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(products.len(), contract.products.len());

    for (stored, expected) in products.iter().zip(&contract.products) {
        require_eq!(stored.id.0, expected.id, "catalog order should follow the contract");
        require_eq!(stored.name, expected.name);
        let price = Decimal::from_str(&expected.price).map_err(|error| error.to_string())?;
        require_eq!(stored.price, price);
        require_eq!(stored.stock, expected.stock);
        require_eq!(stored.in_stock, expected.in_stock);
    }

    Ok(())
}
