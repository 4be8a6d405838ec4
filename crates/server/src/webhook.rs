//! HTTP intake: the page-event webhook and the externally triggered follow-up sweep.
//!
//! The webhook only decodes and buffers. Turns run later on the debounce timers, so the
//! platform always gets its `200` without waiting on the model or the database.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use dokan_agent::{FollowupSweeper, SweepReport};
use dokan_core::errors::{ApplicationError, InterfaceError};
use dokan_messenger::{parse_webhook, IntakeSummary, MessageIntake};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookState {
    intake: Arc<MessageIntake>,
    sweeper: Arc<FollowupSweeper>,
}

impl WebhookState {
    pub fn new(intake: Arc<MessageIntake>, sweeper: Arc<FollowupSweeper>) -> Self {
        Self { intake, sweeper }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    #[serde(flatten)]
    pub summary: IntakeSummary,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

/// Renders an [`InterfaceError`] as a JSON error with the matching status code.
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive))
        .route("/followups/sweep", post(sweep))
        .with_state(state)
}

pub async fn receive(
    State(state): State<WebhookState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let batch = match parse_webhook(&body) {
        Ok(batch) => batch,
        Err(error) => {
            let correlation_id = Uuid::new_v4().to_string();
            warn!(
                event_name = "ingress.webhook.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "webhook payload rejected"
            );
            return Err(ApiError(InterfaceError::BadRequest {
                message: error.to_string(),
                correlation_id,
            }));
        }
    };

    let summary = state.intake.accept_batch(batch);
    Ok(Json(WebhookAck { status: "accepted", summary }))
}

pub async fn sweep(State(state): State<WebhookState>) -> Result<Json<SweepReport>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "followup.sweep.triggered",
        correlation_id = %correlation_id,
        "follow-up sweep requested"
    );
    state.sweeper.sweep(Utc::now()).await.map(Json).map_err(|error| {
        let failure = ApplicationError::Persistence(error.to_string());
        warn!(
            event_name = "followup.sweep.failed",
            correlation_id = %correlation_id,
            error = %failure,
            "follow-up sweep failed"
        );
        ApiError(failure.into_interface(correlation_id))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use dokan_agent::FollowupSweeper;
    use dokan_core::config::AppConfig;
    use dokan_core::domain::conversation::{CoalescedTurn, ConversationKey, MerchantId};
    use dokan_core::domain::merchant::{BotSettings, MerchantProfile};
    use dokan_core::domain::session::OrderSession;
    use dokan_db::repositories::{
        InMemoryChatHistoryRepository, InMemoryMerchantRepository, InMemorySessionRepository,
        MerchantRepository, SessionRepository,
    };
    use dokan_messenger::{Coalescer, Deduplicator, MessageIntake, RecordingMessenger, TurnHandler};
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, WebhookState};

    struct IgnoreTurns;

    #[async_trait]
    impl TurnHandler for IgnoreTurns {
        async fn handle_turn(&self, _turn: CoalescedTurn) {}
    }

    struct Fixture {
        app: Router,
        sessions: Arc<InMemorySessionRepository>,
        merchants: Arc<InMemoryMerchantRepository>,
        messenger: Arc<RecordingMessenger>,
    }

    fn fixture() -> Fixture {
        let coalescer = Coalescer::new(Duration::from_secs(3), Arc::new(IgnoreTurns));
        let intake =
            Arc::new(MessageIntake::new(Deduplicator::new(Duration::from_secs(300)), coalescer));
        let sessions = Arc::new(InMemorySessionRepository::default());
        let merchants = Arc::new(InMemoryMerchantRepository::default());
        let messenger = Arc::new(RecordingMessenger::new());
        let sweeper = Arc::new(FollowupSweeper::new(
            sessions.clone(),
            merchants.clone(),
            Arc::new(InMemoryChatHistoryRepository::default()),
            messenger.clone(),
            AppConfig::default().conversation,
        ));
        Fixture { app: router(WebhookState::new(intake, sweeper)), sessions, merchants, messenger }
    }

    fn page_event(mid: &str, text: &str) -> String {
        serde_json::json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "messaging": [{
                    "sender": {"id": "psid-1"},
                    "recipient": {"id": "page-1"},
                    "timestamp": 1_700_000_000_000_i64,
                    "message": {"mid": mid, "text": text}
                }, {
                    "sender": {"id": "psid-1"},
                    "recipient": {"id": "page-1"},
                    "timestamp": 1_700_000_000_100_i64,
                    "delivery": {"mids": [mid]}
                }]
            }]
        })
        .to_string()
    }

    async fn post(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn page_events_are_buffered_and_redeliveries_dropped() {
        let fixture = fixture();

        let event = page_event("mid.1", "saree ache?");
        let (status, body) = post(&fixture.app, "/webhook", event).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["buffered"], 1);
        assert_eq!(body["skipped"], 1);

        let (_, body) = post(&fixture.app, "/webhook", page_event("mid.1", "saree ache?")).await;
        assert_eq!(body["buffered"], 0);
        assert_eq!(body["duplicates"], 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_bad_request() {
        let fixture = fixture();

        let (status, body) = post(&fixture.app, "/webhook", "{not json".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(
            body["error"],
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[tokio::test]
    async fn sweep_endpoint_reports_the_nudges_sent() {
        let fixture = fixture();
        fixture
            .merchants
            .save(MerchantProfile {
                id: MerchantId("page-1".to_string()),
                business_name: "Dokan Demo".to_string(),
                business_address: None,
                business_phone: None,
                delivery_policy: String::new(),
                page_access_token: SecretString::from("token"),
                settings: BotSettings::default(),
                subscription_active: true,
            })
            .await
            .expect("merchant");
        let idle_since = Utc::now() - chrono::Duration::hours(3);
        fixture
            .sessions
            .save(OrderSession::new(ConversationKey::new("page-1", "psid-1"), idle_since))
            .await
            .expect("session");

        let (status, body) = post(&fixture.app, "/followups/sweep", String::new()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidates"], 1);
        assert_eq!(body["sent"], 1);
        assert_eq!(fixture.messenger.texts().await.len(), 1);
    }
}
