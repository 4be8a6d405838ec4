use dokan_core::domain::chat::{ChatMessage, ChatRole};
use dokan_core::domain::conversation::ConversationKey;

use super::{column, decode_timestamp, encode_timestamp, ChatHistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatHistoryRepository {
    pool: DbPool,
}

impl SqlChatHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let merchant_id: String = column(row, "merchant_id")?;
    let customer_id: String = column(row, "customer_id")?;
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;

    Ok(ChatMessage {
        key: ConversationKey::new(merchant_id, customer_id),
        role: ChatRole::parse(&role),
        content: column(row, "content")?,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl ChatHistoryRepository for SqlChatHistoryRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_message (merchant_id, customer_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.key.merchant_id.0)
        .bind(&message.key.customer_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(encode_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(
        &self,
        key: &ConversationKey,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT merchant_id, customer_id, role, content, created_at FROM (
                 SELECT id, merchant_id, customer_id, role, content, created_at
                 FROM chat_message
                 WHERE merchant_id = ? AND customer_id = ?
                 ORDER BY id DESC
                 LIMIT ?
             ) ORDER BY id ASC",
        )
        .bind(&key.merchant_id.0)
        .bind(&key.customer_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn clear(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM chat_message WHERE merchant_id = ? AND customer_id = ?")
            .bind(&key.merchant_id.0)
            .bind(&key.customer_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
