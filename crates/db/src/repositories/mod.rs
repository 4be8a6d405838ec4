use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use dokan_core::domain::chat::ChatMessage;
use dokan_core::domain::conversation::{ConversationKey, MerchantId};
use dokan_core::domain::merchant::MerchantProfile;
use dokan_core::domain::order::{OrderId, OrderRecord};
use dokan_core::domain::product::{CatalogProduct, ProductId};
use dokan_core::domain::session::OrderSession;

pub mod catalog;
pub mod chat_history;
pub mod memory;
pub mod merchant;
pub mod order;
pub mod session;

pub use catalog::SqlCatalogRepository;
pub use chat_history::SqlChatHistoryRepository;
pub use memory::{
    InMemoryCatalogRepository, InMemoryChatHistoryRepository, InMemoryMerchantRepository,
    InMemoryOrderRepository, InMemorySessionRepository,
};
pub use merchant::SqlMerchantRepository;
pub use order::SqlOrderRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait MerchantRepository: Send + Sync {
    async fn find_by_id(&self, id: &MerchantId)
        -> Result<Option<MerchantProfile>, RepositoryError>;
    async fn save(&self, merchant: MerchantProfile) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find(&self, key: &ConversationKey) -> Result<Option<OrderSession>, RepositoryError>;
    async fn save(&self, session: OrderSession) -> Result<(), RepositoryError>;
    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError>;

    /// Sessions idle since before `inactive_since` that have not been nudged yet.
    async fn list_followup_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<OrderSession>, RepositoryError>;

    /// Sets `followup_sent` only while `last_activity_at` still equals `seen_activity_at`.
    /// Returns `false` when the session was touched or removed since it was listed.
    async fn mark_followup_sent(
        &self,
        key: &ConversationKey,
        seen_activity_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ChatHistoryRepository: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// The latest `limit` messages, oldest first.
    async fn recent(
        &self,
        key: &ConversationKey,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    async fn clear(&self, key: &ConversationKey) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Products in catalog order.
    async fn list_for_merchant(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError>;

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError>;

    /// Takes `quantity` units in one conditional write, provided the product is still in
    /// stock with at least that many left. Returns `false` without writing otherwise.
    /// Reaching zero clears `in_stock`. Fails with `NotFound` for unknown ids.
    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError>;

    /// Gives back units taken by `decrement_stock`. A product the decrement left at zero is
    /// put back in stock.
    async fn increment_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError>;
    async fn list_for_customer(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<OrderRecord>, RepositoryError>;
}

/// Fixed-width UTC timestamps so that text comparison in SQL orders them correctly.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

pub(crate) fn decode_decimal(value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal `{value}`: {error}")))
}

pub(crate) fn decode_count(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} out of range: {value}")))
}

fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn column<'r, T>(
    row: &'r sqlx::sqlite::SqliteRow,
    name: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(name).map_err(decode_error)
}
