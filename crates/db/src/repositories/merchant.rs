use chrono::Utc;
use secrecy::ExposeSecret;

use dokan_core::domain::conversation::MerchantId;
use dokan_core::domain::merchant::{BotSettings, MerchantProfile};

use super::{column, decode_count, encode_timestamp, MerchantRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMerchantRepository {
    pool: DbPool,
}

impl SqlMerchantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_merchant(row: &sqlx::sqlite::SqliteRow) -> Result<MerchantProfile, RepositoryError> {
    let token: String = column(row, "page_access_token")?;
    let reply_delay_secs: i64 = column(row, "reply_delay_secs")?;

    Ok(MerchantProfile {
        id: MerchantId(column(row, "id")?),
        business_name: column(row, "business_name")?,
        business_address: column(row, "business_address")?,
        business_phone: column(row, "business_phone")?,
        delivery_policy: column(row, "delivery_policy")?,
        page_access_token: token.into(),
        settings: BotSettings {
            ai_reply_enabled: column(row, "ai_reply_enabled")?,
            hybrid_mode: column(row, "hybrid_mode")?,
            faq_only_mode: column(row, "faq_only_mode")?,
            reply_delay_secs: u64::from(decode_count("reply_delay_secs", reply_delay_secs)?),
        },
        subscription_active: column(row, "subscription_active")?,
    })
}

#[async_trait::async_trait]
impl MerchantRepository for SqlMerchantRepository {
    async fn find_by_id(
        &self,
        id: &MerchantId,
    ) -> Result<Option<MerchantProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, business_name, business_address, business_phone, delivery_policy,
                    page_access_token, ai_reply_enabled, hybrid_mode, faq_only_mode,
                    reply_delay_secs, subscription_active
             FROM merchant WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_merchant).transpose()
    }

    async fn save(&self, merchant: MerchantProfile) -> Result<(), RepositoryError> {
        let now = encode_timestamp(&Utc::now());
        let reply_delay_secs = i64::try_from(merchant.settings.reply_delay_secs)
            .map_err(|_| RepositoryError::Decode("reply_delay_secs out of range".to_string()))?;

        sqlx::query(
            "INSERT INTO merchant (id, business_name, business_address, business_phone,
                                   delivery_policy, page_access_token, ai_reply_enabled,
                                   hybrid_mode, faq_only_mode, reply_delay_secs,
                                   subscription_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 business_name = excluded.business_name,
                 business_address = excluded.business_address,
                 business_phone = excluded.business_phone,
                 delivery_policy = excluded.delivery_policy,
                 page_access_token = excluded.page_access_token,
                 ai_reply_enabled = excluded.ai_reply_enabled,
                 hybrid_mode = excluded.hybrid_mode,
                 faq_only_mode = excluded.faq_only_mode,
                 reply_delay_secs = excluded.reply_delay_secs,
                 subscription_active = excluded.subscription_active,
                 updated_at = excluded.updated_at",
        )
        .bind(&merchant.id.0)
        .bind(&merchant.business_name)
        .bind(&merchant.business_address)
        .bind(&merchant.business_phone)
        .bind(&merchant.delivery_policy)
        .bind(merchant.page_access_token.expose_secret())
        .bind(merchant.settings.ai_reply_enabled)
        .bind(merchant.settings.hybrid_mode)
        .bind(merchant.settings.faq_only_mode)
        .bind(reply_delay_secs)
        .bind(merchant.subscription_active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use dokan_core::domain::conversation::MerchantId;
    use dokan_core::domain::merchant::{BotSettings, MerchantProfile};

    use super::SqlMerchantRepository;
    use crate::repositories::MerchantRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_merchant(id: &str) -> MerchantProfile {
        MerchantProfile {
            id: MerchantId(id.to_string()),
            business_name: "Nakshi Kantha House".to_string(),
            business_address: Some("House 12, Road 5, Dhanmondi".to_string()),
            business_phone: None,
            delivery_policy: "Inside Dhaka 60 taka, outside 120 taka".to_string(),
            page_access_token: "EAAB-page-token".to_string().into(),
            settings: BotSettings { reply_delay_secs: 2, ..BotSettings::default() },
            subscription_active: true,
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let repo = SqlMerchantRepository::new(setup().await);
        repo.save(sample_merchant("page-1")).await.expect("save");

        let found = repo
            .find_by_id(&MerchantId("page-1".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.business_name, "Nakshi Kantha House");
        assert_eq!(found.business_phone, None);
        assert_eq!(found.settings.reply_delay_secs, 2);
        assert!(found.settings.hybrid_mode);
        assert_eq!(found.page_access_token.expose_secret(), "EAAB-page-token");
    }

    #[tokio::test]
    async fn save_upserts_settings() {
        let repo = SqlMerchantRepository::new(setup().await);
        let mut merchant = sample_merchant("page-1");
        repo.save(merchant.clone()).await.expect("save");

        merchant.settings.ai_reply_enabled = false;
        merchant.subscription_active = false;
        repo.save(merchant).await.expect("upsert");

        let found = repo
            .find_by_id(&MerchantId("page-1".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        assert!(!found.replies_allowed());
    }

    #[tokio::test]
    async fn unknown_merchant_is_none() {
        let repo = SqlMerchantRepository::new(setup().await);
        let found = repo.find_by_id(&MerchantId("nope".to_string())).await.expect("find");
        assert!(found.is_none());
    }
}
