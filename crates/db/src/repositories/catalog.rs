use chrono::Utc;

use dokan_core::domain::conversation::MerchantId;
use dokan_core::domain::product::{CatalogProduct, ProductId};

use super::{
    column, decode_count, decode_decimal, encode_timestamp, CatalogRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogProduct, RepositoryError> {
    let price: String = column(row, "price")?;
    let stock: i64 = column(row, "stock")?;

    Ok(CatalogProduct {
        id: ProductId(column(row, "id")?),
        merchant_id: MerchantId(column(row, "merchant_id")?),
        name: column(row, "name")?,
        price: decode_decimal(&price)?,
        stock: decode_count("stock", stock)?,
        in_stock: column(row, "in_stock")?,
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_for_merchant(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, merchant_id, name, price, stock, in_stock
             FROM catalog_product WHERE merchant_id = ? ORDER BY rowid ASC",
        )
        .bind(&merchant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO catalog_product (id, merchant_id, name, price, stock, in_stock, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 stock = excluded.stock,
                 in_stock = excluded.in_stock,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.merchant_id.0)
        .bind(&product.name)
        .bind(product.price.to_string())
        .bind(i64::from(product.stock))
        .bind(product.in_stock)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE catalog_product
             SET stock = stock - ?1,
                 in_stock = CASE WHEN stock = ?1 THEN 0 ELSE in_stock END,
                 updated_at = ?2
             WHERE id = ?3 AND in_stock = 1 AND stock > 0 AND stock >= ?1",
        )
        .bind(i64::from(quantity))
        .bind(encode_timestamp(&Utc::now()))
        .bind(&product_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.ensure_exists(product_id).await?;
        Ok(false)
    }

    async fn increment_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE catalog_product
             SET stock = stock + ?1,
                 in_stock = CASE WHEN stock = 0 THEN 1 ELSE in_stock END,
                 updated_at = ?2
             WHERE id = ?3",
        )
        .bind(i64::from(quantity))
        .bind(encode_timestamp(&Utc::now()))
        .bind(&product_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(product_id));
        }
        Ok(())
    }
}

impl SqlCatalogRepository {
    async fn ensure_exists(&self, product_id: &ProductId) -> Result<(), RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_product WHERE id = ?")
            .bind(&product_id.0)
            .fetch_one(&self.pool)
            .await?;
        if count == 0 {
            return Err(not_found(product_id));
        }
        Ok(())
    }
}

fn not_found(product_id: &ProductId) -> RepositoryError {
    RepositoryError::NotFound(format!("catalog product {}", product_id.0))
}
