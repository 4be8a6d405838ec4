use std::sync::Arc;
use std::time::Duration;

use dokan_agent::{
    client_from_config, AgentDependencies, AgentRuntime, FollowupSweeper, LlmError,
    LlmOrderExtractor, LlmReplyGenerator,
};
use dokan_core::config::{AppConfig, ConfigError, LoadOptions};
use dokan_db::repositories::{
    SqlCatalogRepository, SqlChatHistoryRepository, SqlMerchantRepository, SqlOrderRepository,
    SqlSessionRepository,
};
use dokan_db::{connect, migrations, DbPool};
use dokan_messenger::{Coalescer, Deduplicator, DeliveryError, GraphMessenger, MessageIntake};
use thiserror::Error;
use tracing::info;

use crate::audit::TracingAuditSink;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub intake: Arc<MessageIntake>,
    pub sweeper: Arc<FollowupSweeper>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("messenger client could not be built: {0}")]
    Messenger(#[from] DeliveryError),
    #[error("llm client could not be built: {0}")]
    Llm(#[from] LlmError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let merchants = Arc::new(SqlMerchantRepository::new(db_pool.clone()));
    let sessions = Arc::new(SqlSessionRepository::new(db_pool.clone()));
    let history = Arc::new(SqlChatHistoryRepository::new(db_pool.clone()));
    let messenger = Arc::new(GraphMessenger::new(
        &config.messenger.api_base_url,
        Duration::from_secs(config.messenger.timeout_secs),
    )?);
    let llm = client_from_config(&config.llm)?;

    let runtime = AgentRuntime::new(AgentDependencies {
        merchants: merchants.clone(),
        sessions: sessions.clone(),
        history: history.clone(),
        catalog: Arc::new(SqlCatalogRepository::new(db_pool.clone())),
        orders: Arc::new(SqlOrderRepository::new(db_pool.clone())),
        messenger: messenger.clone(),
        extractor: Arc::new(LlmOrderExtractor::new(llm.clone())),
        replies: Arc::new(LlmReplyGenerator::new(llm)),
        audit: Arc::new(TracingAuditSink),
    });
    let coalescer = Coalescer::new(config.conversation.quiet_window(), Arc::new(runtime));
    let intake = MessageIntake::new(Deduplicator::new(config.conversation.dedup_ttl()), coalescer);
    let sweeper = FollowupSweeper::new(
        sessions,
        merchants,
        history,
        messenger,
        config.conversation.clone(),
    );
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        quiet_window_ms = config.conversation.quiet_window_ms,
        "conversation runtime wired"
    );

    Ok(Application { config, db_pool, intake: Arc::new(intake), sweeper: Arc::new(sweeper) })
}

#[cfg(test)]
mod tests {
    use dokan_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_llm_keys_for_openai() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_keys: Some(Vec::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_keys"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_runtime() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('merchant', 'catalog_product', 'order_session', 'chat_message', 'customer_order')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5);
        assert_eq!(app.intake.coalescer().active_conversations(), 0);

        app.db_pool.close().await;
    }
}
