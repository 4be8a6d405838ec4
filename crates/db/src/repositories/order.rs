use dokan_core::domain::conversation::ConversationKey;
use dokan_core::domain::order::{OrderId, OrderLine, OrderRecord, OrderStatus};
use dokan_core::domain::product::ProductId;

use super::{
    column, decode_count, decode_decimal, decode_timestamp, encode_timestamp, OrderRepository,
    RepositoryError,
};
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, merchant_id, customer_id, customer_name, phone, address,
     subtotal, delivery_charge, total, status, created_at";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_id: &str) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, product_name, quantity, unit_price
             FROM customer_order_line WHERE order_id = ? ORDER BY line_no ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let quantity: i64 = column(row, "quantity")?;
                let unit_price: String = column(row, "unit_price")?;
                Ok(OrderLine {
                    product_id: ProductId(column(row, "product_id")?),
                    product_name: column(row, "product_name")?,
                    quantity: decode_count("quantity", quantity)?,
                    unit_price: decode_decimal(&unit_price)?,
                })
            })
            .collect()
    }

    async fn hydrate(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<OrderRecord, RepositoryError> {
        let id: String = column(row, "id")?;
        let merchant_id: String = column(row, "merchant_id")?;
        let customer_id: String = column(row, "customer_id")?;
        let subtotal: String = column(row, "subtotal")?;
        let delivery_charge: String = column(row, "delivery_charge")?;
        let total: String = column(row, "total")?;
        let status: String = column(row, "status")?;
        let created_at: String = column(row, "created_at")?;
        let lines = self.load_lines(&id).await?;

        Ok(OrderRecord {
            id: OrderId(id),
            key: ConversationKey::new(merchant_id, customer_id),
            customer_name: column(row, "customer_name")?,
            phone: column(row, "phone")?,
            address: column(row, "address")?,
            lines,
            subtotal: decode_decimal(&subtotal)?,
            delivery_charge: decode_decimal(&delivery_charge)?,
            total: decode_decimal(&total)?,
            status: OrderStatus::parse(&status),
            created_at: decode_timestamp(&created_at)?,
        })
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO customer_order (id, merchant_id, customer_id, customer_name, phone,
                                         address, subtotal, delivery_charge, total, status,
                                         created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 customer_name = excluded.customer_name,
                 phone = excluded.phone,
                 address = excluded.address,
                 subtotal = excluded.subtotal,
                 delivery_charge = excluded.delivery_charge,
                 total = excluded.total,
                 status = excluded.status",
        )
        .bind(&order.id.0)
        .bind(&order.key.merchant_id.0)
        .bind(&order.key.customer_id.0)
        .bind(&order.customer_name)
        .bind(&order.phone)
        .bind(&order.address)
        .bind(order.subtotal.to_string())
        .bind(order.delivery_charge.to_string())
        .bind(order.total.to_string())
        .bind(order.status.as_str())
        .bind(encode_timestamp(&order.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM customer_order_line WHERE order_id = ?")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO customer_order_line (order_id, line_no, product_id, product_name,
                                                  quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(line_no as i64)
            .bind(&line.product_id.0)
            .bind(&line.product_name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_customer(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order
             WHERE merchant_id = ? AND customer_id = ?
             ORDER BY created_at DESC"
        ))
        .bind(&key.merchant_id.0)
        .bind(&key.customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use dokan_core::domain::conversation::ConversationKey;
    use dokan_core::domain::order::{OrderId, OrderLine, OrderRecord, OrderStatus};
    use dokan_core::domain::product::ProductId;

    use super::SqlOrderRepository;
    use crate::repositories::OrderRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlOrderRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query(
            "INSERT INTO merchant (id, business_name, page_access_token, created_at, updated_at)
             VALUES ('page-1', 'Shop', 'token', '2026-01-01T00:00:00.000000Z',
                     '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert merchant");
        SqlOrderRepository::new(pool)
    }

    fn sample_order(customer: &str) -> OrderRecord {
        let lines = vec![
            OrderLine {
                product_id: ProductId("saree".to_string()),
                product_name: "Cotton Saree".to_string(),
                quantity: 2,
                unit_price: Decimal::new(1_250, 0),
            },
            OrderLine {
                product_id: ProductId("scarf".to_string()),
                product_name: "Silk Scarf".to_string(),
                quantity: 1,
                unit_price: Decimal::new(450, 0),
            },
        ];
        OrderRecord {
            id: OrderId::generate(),
            key: ConversationKey::new("page-1", customer),
            customer_name: "Rahim".to_string(),
            phone: "01811111111".to_string(),
            address: "Mirpur 10, Dhaka".to_string(),
            lines,
            subtotal: Decimal::new(2_950, 0),
            delivery_charge: Decimal::new(60, 0),
            total: Decimal::new(3_010, 0),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_find_with_lines() {
        let repo = setup().await;
        let order = sample_order("psid-1");
        repo.save(order.clone()).await.expect("save");

        let found = repo.find_by_id(&order.id).await.expect("find").expect("should exist");

        assert_eq!(found.lines, order.lines);
        assert_eq!(found.total, Decimal::new(3_010, 0));
        assert_eq!(found.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn resave_replaces_lines_and_status() {
        let repo = setup().await;
        let mut order = sample_order("psid-1");
        repo.save(order.clone()).await.expect("save");

        order.lines.truncate(1);
        order.status = OrderStatus::Shipped;
        repo.save(order.clone()).await.expect("upsert");

        let found = repo.find_by_id(&order.id).await.expect("find").expect("should exist");
        assert_eq!(found.lines.len(), 1);
        assert_eq!(found.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn list_for_customer_filters_by_conversation() {
        let repo = setup().await;
        repo.save(sample_order("psid-1")).await.expect("save 1");
        repo.save(sample_order("psid-1")).await.expect("save 2");
        repo.save(sample_order("psid-2")).await.expect("save 3");

        let orders =
            repo.list_for_customer(&ConversationKey::new("page-1", "psid-1")).await.expect("list");

        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|order| order.key.customer_id.0 == "psid-1"));
    }
}
