use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use dokan_core::domain::chat::ChatMessage;
use dokan_core::domain::conversation::{ConversationKey, MerchantId};
use dokan_core::domain::merchant::MerchantProfile;
use dokan_core::domain::order::{OrderId, OrderRecord};
use dokan_core::domain::product::{CatalogProduct, ProductId};
use dokan_core::domain::session::OrderSession;

use super::{
    CatalogRepository, ChatHistoryRepository, MerchantRepository, OrderRepository,
    RepositoryError, SessionRepository,
};

#[derive(Default)]
pub struct InMemoryMerchantRepository {
    merchants: RwLock<HashMap<String, MerchantProfile>>,
}

#[async_trait::async_trait]
impl MerchantRepository for InMemoryMerchantRepository {
    async fn find_by_id(
        &self,
        id: &MerchantId,
    ) -> Result<Option<MerchantProfile>, RepositoryError> {
        let merchants = self.merchants.read().await;
        Ok(merchants.get(&id.0).cloned())
    }

    async fn save(&self, merchant: MerchantProfile) -> Result<(), RepositoryError> {
        let mut merchants = self.merchants.write().await;
        merchants.insert(merchant.id.0.clone(), merchant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<ConversationKey, OrderSession>>,
}

impl InMemorySessionRepository {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find(&self, key: &ConversationKey) -> Result<Option<OrderSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).cloned())
    }

    async fn save(&self, session: OrderSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.key.clone(), session);
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key);
        Ok(())
    }

    async fn list_followup_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<OrderSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut candidates = sessions
            .values()
            .filter(|session| !session.followup_sent && session.last_activity_at < inactive_since)
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by_key(|session| session.last_activity_at);
        Ok(candidates)
    }

    async fn mark_followup_sent(
        &self,
        key: &ConversationKey,
        seen_activity_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(key) {
            Some(session) if session.last_activity_at == seen_activity_at => {
                session.followup_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryChatHistoryRepository {
    messages: RwLock<HashMap<ConversationKey, Vec<ChatMessage>>>,
}

#[async_trait::async_trait]
impl ChatHistoryRepository for InMemoryChatHistoryRepository {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.entry(message.key.clone()).or_default().push(message);
        Ok(())
    }

    async fn recent(
        &self,
        key: &ConversationKey,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let history = messages.get(key).map(Vec::as_slice).unwrap_or_default();
        let start = history.len().saturating_sub(limit as usize);
        Ok(history[start..].to_vec())
    }

    async fn clear(&self, key: &ConversationKey) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.remove(key);
        Ok(())
    }
}

/// Products are kept in insertion order so name matching sees catalog order.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<Vec<CatalogProduct>>,
    failing_updates: RwLock<Vec<ProductId>>,
}

impl InMemoryCatalogRepository {
    /// Makes every later stock write for this product fail as if the pool had gone away.
    pub async fn fail_updates_for(&self, product_id: ProductId) {
        self.failing_updates.write().await.push(product_id);
    }

    async fn check_failure(&self, product_id: &ProductId) -> Result<(), RepositoryError> {
        if self.failing_updates.read().await.contains(product_id) {
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    pub async fn get(&self, product_id: &ProductId) -> Option<CatalogProduct> {
        self.products.read().await.iter().find(|product| &product.id == product_id).cloned()
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_for_merchant(
        &self,
        merchant_id: &MerchantId,
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products
            .iter()
            .filter(|product| &product.merchant_id == merchant_id)
            .cloned()
            .collect())
    }

    async fn save(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|existing| existing.id == product.id) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
        Ok(())
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        self.check_failure(product_id).await?;

        let mut products = self.products.write().await;
        let product = find_product(&mut products, product_id)?;
        if !product.is_sellable() || product.stock < quantity {
            return Ok(false);
        }
        product.set_stock(product.stock - quantity);
        Ok(true)
    }

    async fn increment_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        self.check_failure(product_id).await?;

        let mut products = self.products.write().await;
        let product = find_product(&mut products, product_id)?;
        if product.stock == 0 {
            product.in_stock = true;
        }
        product.stock = product.stock.saturating_add(quantity);
        Ok(())
    }
}

fn find_product<'a>(
    products: &'a mut [CatalogProduct],
    product_id: &ProductId,
) -> Result<&'a mut CatalogProduct, RepositoryError> {
    products
        .iter_mut()
        .find(|product| &product.id == product_id)
        .ok_or_else(|| RepositoryError::NotFound(format!("catalog product {}", product_id.0)))
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<OrderRecord>>,
    reject_saves: RwLock<bool>,
}

impl InMemoryOrderRepository {
    pub async fn all(&self) -> Vec<OrderRecord> {
        self.orders.read().await.clone()
    }

    pub async fn reject_saves(&self, reject: bool) {
        *self.reject_saves.write().await = reject;
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: OrderRecord) -> Result<(), RepositoryError> {
        if *self.reject_saves.read().await {
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }

        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|existing| existing.id == order.id) {
            Some(existing) => *existing = order,
            None => orders.push(order),
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn list_for_customer(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().rev().filter(|order| &order.key == key).cloned().collect())
    }
}
