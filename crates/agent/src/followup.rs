use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dokan_core::config::ConversationConfig;
use dokan_core::domain::chat::ChatMessage;
use dokan_core::domain::merchant::MerchantProfile;
use dokan_db::repositories::{
    ChatHistoryRepository, MerchantRepository, RepositoryError, SessionRepository,
};
use dokan_messenger::Messenger;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub sent: usize,
    /// Merchant gone, unsubscribed or with replies turned off.
    pub skipped: usize,
    /// Delivery or bookkeeping failed; the session is picked up again next sweep.
    pub failed: usize,
}

/// Nudges customers who went quiet with an unfinished order. Each session gets at most
/// one nudge until the customer is heard from again.
pub struct FollowupSweeper {
    sessions: Arc<dyn SessionRepository>,
    merchants: Arc<dyn MerchantRepository>,
    history: Arc<dyn ChatHistoryRepository>,
    messenger: Arc<dyn Messenger>,
    conversation: ConversationConfig,
}

impl FollowupSweeper {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        merchants: Arc<dyn MerchantRepository>,
        history: Arc<dyn ChatHistoryRepository>,
        messenger: Arc<dyn Messenger>,
        conversation: ConversationConfig,
    ) -> Self {
        Self { sessions, merchants, history, messenger, conversation }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RepositoryError> {
        let cutoff = self.conversation.followup_cutoff(now);
        let candidates = self.sessions.list_followup_candidates(cutoff).await?;
        let mut report = SweepReport { candidates: candidates.len(), ..SweepReport::default() };
        let mut merchants: HashMap<String, Option<MerchantProfile>> = HashMap::new();

        for session in candidates {
            let merchant_id = session.key.merchant_id.clone();
            if !merchants.contains_key(&merchant_id.0) {
                let merchant = self.merchants.find_by_id(&merchant_id).await?;
                merchants.insert(merchant_id.0.clone(), merchant);
            }
            let Some(merchant) = merchants
                .get(&merchant_id.0)
                .and_then(Option::as_ref)
                .filter(|merchant| merchant.replies_allowed())
            else {
                report.skipped += 1;
                continue;
            };

            let message = self.conversation.followup_message.as_str();
            let recipient = &session.key.customer_id;
            if let Err(error) =
                self.messenger.send_text(&merchant.page_access_token, recipient, message).await
            {
                warn!(
                    event_name = "followup.message.failed",
                    merchant_id = %merchant_id.0,
                    customer_id = %recipient.0,
                    error = %error,
                    "follow-up not delivered; will retry next sweep"
                );
                report.failed += 1;
                continue;
            }

            let key = session.key;
            match self.sessions.mark_followup_sent(&key, session.last_activity_at).await {
                Ok(true) => {}
                Ok(false) => info!(
                    event_name = "followup.session.changed",
                    merchant_id = %key.merchant_id.0,
                    customer_id = %key.customer_id.0,
                    "customer was active during the nudge; session left as the turn saved it"
                ),
                Err(error) => {
                    warn!(
                        event_name = "followup.session.mark_failed",
                        merchant_id = %key.merchant_id.0,
                        customer_id = %key.customer_id.0,
                        error = %error,
                        "follow-up sent but not recorded"
                    );
                    report.failed += 1;
                    continue;
                }
            }
            if let Err(error) = self.history.append(ChatMessage::assistant(key, message)).await {
                warn!(
                    event_name = "followup.history.append_failed",
                    error = %error,
                    "follow-up missing from history"
                );
            }
            report.sent += 1;
        }

        info!(
            event_name = "followup.sweep.completed",
            candidates = report.candidates,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "follow-up sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use dokan_core::config::AppConfig;
    use dokan_core::domain::conversation::{ConversationKey, CustomerId, MerchantId};
    use dokan_core::domain::merchant::{BotSettings, MerchantProfile};
    use dokan_core::domain::session::OrderSession;
    use dokan_db::repositories::{
        InMemoryChatHistoryRepository, InMemoryMerchantRepository, InMemorySessionRepository,
        MerchantRepository, SessionRepository,
    };
    use dokan_messenger::{DeliveryError, Messenger, RecordingMessenger, SenderAction};
    use secrecy::SecretString;

    use super::FollowupSweeper;

    fn merchant(id: &str, subscription_active: bool) -> MerchantProfile {
        MerchantProfile {
            id: MerchantId(id.to_string()),
            business_name: "Dokan Demo".to_string(),
            business_address: None,
            business_phone: None,
            delivery_policy: String::new(),
            page_access_token: SecretString::from("token"),
            settings: BotSettings::default(),
            subscription_active,
        }
    }

    /// Delivers the nudge while a customer turn for the same conversation is saved.
    struct TurnDuringNudge {
        sessions: Arc<InMemorySessionRepository>,
    }

    #[async_trait]
    impl Messenger for TurnDuringNudge {
        async fn send_text(
            &self,
            _token: &SecretString,
            recipient: &CustomerId,
            _text: &str,
        ) -> Result<(), DeliveryError> {
            let key = ConversationKey::new("page-1", &recipient.0);
            let mut session = self.sessions.find(&key).await.ok().flatten().expect("session");
            session.address = Some("Mirpur 10".to_string());
            session.record_activity(Utc::now());
            self.sessions.save(session).await.expect("turn saved");
            Ok(())
        }

        async fn send_image(
            &self,
            _token: &SecretString,
            _recipient: &CustomerId,
            _url: &str,
        ) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn send_action(
            &self,
            _token: &SecretString,
            _recipient: &CustomerId,
            _action: SenderAction,
        ) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn idle_session(merchant: &str, customer: &str, idle_mins: i64) -> OrderSession {
        let then = Utc::now() - Duration::minutes(idle_mins);
        OrderSession::new(ConversationKey::new(merchant, customer), then)
    }

    #[tokio::test]
    async fn idle_sessions_are_nudged_once() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let merchants = Arc::new(InMemoryMerchantRepository::default());
        let messenger = Arc::new(RecordingMessenger::new());
        merchants.save(merchant("page-1", true)).await.expect("merchant");
        merchants.save(merchant("page-off", false)).await.expect("merchant");
        sessions.save(idle_session("page-1", "idle", 90)).await.expect("session");
        sessions.save(idle_session("page-1", "fresh", 5)).await.expect("session");
        sessions.save(idle_session("page-off", "idle", 90)).await.expect("session");

        let conversation = AppConfig::default().conversation;
        let expected = conversation.followup_message.clone();
        let sweeper = FollowupSweeper::new(
            sessions.clone(),
            merchants,
            Arc::new(InMemoryChatHistoryRepository::default()),
            messenger.clone(),
            conversation,
        );

        let report = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!((report.candidates, report.sent, report.skipped), (2, 1, 1));
        assert_eq!(messenger.texts().await, vec![expected]);

        let nudged = sessions
            .find(&ConversationKey::new("page-1", "idle"))
            .await
            .expect("find")
            .expect("still there");
        assert!(nudged.followup_sent);

        let again = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!(again.sent, 0, "already nudged");
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_next_sweep() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let merchants = Arc::new(InMemoryMerchantRepository::default());
        let messenger = Arc::new(RecordingMessenger::new());
        merchants.save(merchant("page-1", true)).await.expect("merchant");
        sessions.save(idle_session("page-1", "idle", 90)).await.expect("session");
        messenger.fail_deliveries(true).await;

        let sweeper = FollowupSweeper::new(
            sessions.clone(),
            merchants,
            Arc::new(InMemoryChatHistoryRepository::default()),
            messenger.clone(),
            AppConfig::default().conversation,
        );

        let report = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!(report.failed, 1);

        messenger.fail_deliveries(false).await;
        let report = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn turn_saved_during_the_nudge_is_kept() {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let merchants = Arc::new(InMemoryMerchantRepository::default());
        merchants.save(merchant("page-1", true)).await.expect("merchant");
        sessions.save(idle_session("page-1", "idle", 90)).await.expect("session");

        let sweeper = FollowupSweeper::new(
            sessions.clone(),
            merchants,
            Arc::new(InMemoryChatHistoryRepository::default()),
            Arc::new(TurnDuringNudge { sessions: sessions.clone() }),
            AppConfig::default().conversation,
        );

        let report = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!(report.sent, 1);

        let session = sessions
            .find(&ConversationKey::new("page-1", "idle"))
            .await
            .expect("find")
            .expect("still there");
        assert_eq!(session.address.as_deref(), Some("Mirpur 10"));
        assert_eq!(session.step, 1);
        assert!(!session.followup_sent, "customer was heard from after listing");
    }
}
