use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use dokan_db::{migrations, DbPool};
use dokan_messenger::MessageIntake;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    intake: Arc<MessageIntake>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: CheckStatus,
    pub checks: Vec<HealthCheck>,
    /// Conversations with buffered or in-flight turns.
    pub active_conversations: usize,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, intake: Arc<MessageIntake>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, intake })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let checks = vec![database_check(&state.db_pool).await, schema_check(&state.db_pool).await];
    let ready = checks.iter().all(|check| check.status == CheckStatus::Ready);

    let payload = HealthResponse {
        status: if ready { CheckStatus::Ready } else { CheckStatus::Degraded },
        checks,
        active_conversations: state.intake.coalescer().active_conversations(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    let (status, detail) = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => (CheckStatus::Ready, "database query succeeded".to_string()),
        Err(error) => (CheckStatus::Degraded, format!("database query failed: {error}")),
    };
    HealthCheck { name: "database", status, detail }
}

async fn schema_check(pool: &DbPool) -> HealthCheck {
    let expected = migrations::embedded_count();
    let (status, detail) = match migrations::applied_count(pool).await {
        Ok(applied) if applied >= expected => {
            (CheckStatus::Ready, format!("{applied} of {expected} migration(s) applied"))
        }
        Ok(applied) => {
            (CheckStatus::Degraded, format!("{applied} of {expected} migration(s) applied"))
        }
        Err(error) => (CheckStatus::Degraded, format!("migration state unreadable: {error}")),
    };
    HealthCheck { name: "schema", status, detail }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use dokan_core::domain::conversation::CoalescedTurn;
    use dokan_db::{connect_with_settings, migrations, DbPool};
    use dokan_messenger::{Coalescer, Deduplicator, MessageIntake, TurnHandler};

    use super::{health, CheckStatus, HealthState};

    struct IgnoreTurns;

    #[async_trait]
    impl TurnHandler for IgnoreTurns {
        async fn handle_turn(&self, _turn: CoalescedTurn) {}
    }

    fn state(db_pool: DbPool) -> State<HealthState> {
        let coalescer = Coalescer::new(Duration::from_secs(3), Arc::new(IgnoreTurns));
        let intake =
            Arc::new(MessageIntake::new(Deduplicator::new(Duration::from_secs(60)), coalescer));
        State(HealthState { db_pool, intake })
    }

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    #[tokio::test]
    async fn migrated_database_is_ready() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrate");

        let (status, Json(payload)) = health(state(pool.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, CheckStatus::Ready);
        assert_eq!(payload.checks.len(), 2);
        assert_eq!(payload.active_conversations, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_database_is_degraded() {
        let pool = pool().await;

        let (status, Json(payload)) = health(state(pool.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let schema = payload.checks.iter().find(|check| check.name == "schema").expect("schema");
        assert_eq!(schema.status, CheckStatus::Degraded);
        assert_eq!(payload.checks[0].status, CheckStatus::Ready, "database itself answers");

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_service_unavailable() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(payload)) = health(state(pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(payload.checks.iter().all(|check| check.status == CheckStatus::Degraded));
    }
}
