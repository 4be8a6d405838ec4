use chrono::{DateTime, Utc};

use dokan_core::domain::conversation::ConversationKey;
use dokan_core::domain::session::{LineItem, OrderSession};

use super::{
    column, decode_count, decode_decimal, decode_timestamp, encode_timestamp, RepositoryError,
    SessionRepository,
};
use crate::DbPool;

const SESSION_COLUMNS: &str = "merchant_id, customer_id, step, name, phone, address, items_json,
     delivery_charge, summary_shown, followup_sent, created_at, last_activity_at";

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<OrderSession, RepositoryError> {
    let merchant_id: String = column(row, "merchant_id")?;
    let customer_id: String = column(row, "customer_id")?;
    let step: i64 = column(row, "step")?;
    let items_json: String = column(row, "items_json")?;
    let delivery_charge: String = column(row, "delivery_charge")?;
    let created_at: String = column(row, "created_at")?;
    let last_activity_at: String = column(row, "last_activity_at")?;

    let items: Vec<LineItem> = serde_json::from_str(&items_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid items_json: {error}")))?;

    Ok(OrderSession {
        key: ConversationKey::new(merchant_id, customer_id),
        step: decode_count("step", step)?,
        name: column(row, "name")?,
        phone: column(row, "phone")?,
        address: column(row, "address")?,
        items,
        delivery_charge: decode_decimal(&delivery_charge)?,
        summary_shown: column(row, "summary_shown")?,
        followup_sent: column(row, "followup_sent")?,
        created_at: decode_timestamp(&created_at)?,
        last_activity_at: decode_timestamp(&last_activity_at)?,
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find(&self, key: &ConversationKey) -> Result<Option<OrderSession>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM order_session WHERE merchant_id = ? AND customer_id = ?"
        ))
        .bind(&key.merchant_id.0)
        .bind(&key.customer_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn save(&self, session: OrderSession) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&session.items)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO order_session (merchant_id, customer_id, step, name, phone, address,
                                        items_json, delivery_charge, summary_shown,
                                        followup_sent, created_at, last_activity_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(merchant_id, customer_id) DO UPDATE SET
                 step = excluded.step,
                 name = excluded.name,
                 phone = excluded.phone,
                 address = excluded.address,
                 items_json = excluded.items_json,
                 delivery_charge = excluded.delivery_charge,
                 summary_shown = excluded.summary_shown,
                 followup_sent = excluded.followup_sent,
                 last_activity_at = excluded.last_activity_at",
        )
        .bind(&session.key.merchant_id.0)
        .bind(&session.key.customer_id.0)
        .bind(i64::from(session.step))
        .bind(&session.name)
        .bind(&session.phone)
        .bind(&session.address)
        .bind(&items_json)
        .bind(session.delivery_charge.to_string())
        .bind(session.summary_shown)
        .bind(session.followup_sent)
        .bind(encode_timestamp(&session.created_at))
        .bind(encode_timestamp(&session.last_activity_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM order_session WHERE merchant_id = ? AND customer_id = ?")
            .bind(&key.merchant_id.0)
            .bind(&key.customer_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_followup_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<OrderSession>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM order_session
             WHERE followup_sent = 0 AND last_activity_at < ?
             ORDER BY last_activity_at ASC"
        ))
        .bind(encode_timestamp(&inactive_since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn mark_followup_sent(
        &self,
        key: &ConversationKey,
        seen_activity_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE order_session SET followup_sent = 1
             WHERE merchant_id = ? AND customer_id = ? AND last_activity_at = ?",
        )
        .bind(&key.merchant_id.0)
        .bind(&key.customer_id.0)
        .bind(encode_timestamp(&seen_activity_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
