//! Per-turn workflow: runs once for every coalesced turn the debounce layer emits.
//!
//! The decision itself comes from [`TurnEngine`]; this module gathers its inputs
//! (merchant settings, the loaded session, the model's extraction) and carries out the
//! side effects of whichever branch was chosen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dokan_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use dokan_core::commerce::catalog::Catalog;
use dokan_core::commerce::pricing::{price_items, PricedOrder};
use dokan_core::domain::chat::ChatMessage;
use dokan_core::domain::conversation::{CoalescedTurn, ConversationKey};
use dokan_core::domain::merchant::MerchantProfile;
use dokan_core::domain::order::{OrderId, OrderRecord, OrderStatus};
use dokan_core::domain::session::OrderSession;
use dokan_core::errors::ApplicationError;
use dokan_core::flows::{Admission, SilentReason, TurnContext, TurnDecision, TurnEngine, TurnGate};
use dokan_core::intent::{self, Intent};
use dokan_db::repositories::{
    CatalogRepository, ChatHistoryRepository, MerchantRepository, OrderRepository,
    RepositoryError, SessionRepository,
};
use dokan_messenger::{Messenger, SenderAction, TurnHandler};
use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use crate::conversation::{OrderExtractor, ReplyGenerator, ReplyRequest};
use crate::replies;
use crate::reservation::{ReservationError, StockReserver};

/// Chat history handed to the model collaborators.
pub const HISTORY_LIMIT: u32 = 20;

const ACTOR: &str = "workflow";

pub struct AgentDependencies {
    pub merchants: Arc<dyn MerchantRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub history: Arc<dyn ChatHistoryRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub messenger: Arc<dyn Messenger>,
    pub extractor: Arc<dyn OrderExtractor>,
    pub replies: Arc<dyn ReplyGenerator>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    UnknownMerchant,
    Silent(SilentReason),
    Decided(TurnDecision),
    Failed(ApplicationError),
}

pub struct AgentRuntime {
    merchants: Arc<dyn MerchantRepository>,
    sessions: Arc<dyn SessionRepository>,
    history: Arc<dyn ChatHistoryRepository>,
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    messenger: Arc<dyn Messenger>,
    extractor: Arc<dyn OrderExtractor>,
    replies: Arc<dyn ReplyGenerator>,
    audit: Arc<dyn AuditSink>,
    reserver: StockReserver,
    engine: TurnEngine,
}

impl AgentRuntime {
    pub fn new(dependencies: AgentDependencies) -> Self {
        let reserver = StockReserver::new(Arc::clone(&dependencies.catalog));
        Self {
            merchants: dependencies.merchants,
            sessions: dependencies.sessions,
            history: dependencies.history,
            catalog: dependencies.catalog,
            orders: dependencies.orders,
            messenger: dependencies.messenger,
            extractor: dependencies.extractor,
            replies: dependencies.replies,
            audit: dependencies.audit,
            reserver,
            engine: TurnEngine::new(),
        }
    }

    pub async fn process_turn(&self, turn: &CoalescedTurn) -> TurnOutcome {
        let key = &turn.key;
        let correlation_id = turn.correlation_id();

        let merchant = match self.merchants.find_by_id(&key.merchant_id).await {
            Ok(Some(merchant)) => merchant,
            Ok(None) => {
                warn!(
                    event_name = "workflow.turn.unknown_merchant",
                    correlation_id,
                    merchant_id = %key.merchant_id.0,
                    customer_id = %key.customer_id.0,
                    "no merchant registered for page; dropping turn"
                );
                return TurnOutcome::UnknownMerchant;
            }
            Err(error) => return TurnOutcome::Failed(persistence(error)),
        };

        let gate = TurnGate {
            subscription_active: merchant.subscription_active,
            ai_reply_enabled: merchant.settings.ai_reply_enabled,
        };
        if let Admission::Silent(reason) = self.engine.admit(&gate) {
            info!(
                event_name = "workflow.turn.silent",
                correlation_id,
                merchant_id = %key.merchant_id.0,
                customer_id = %key.customer_id.0,
                reason = ?reason,
                "replies are off for this merchant"
            );
            return TurnOutcome::Silent(reason);
        }

        let outbox = Outbox {
            messenger: self.messenger.as_ref(),
            token: &merchant.page_access_token,
            key,
            correlation_id,
            pacing: Duration::from_secs(merchant.settings.reply_delay_secs),
        };
        match self.run_admitted(turn, &merchant, &outbox).await {
            Ok(decision) => TurnOutcome::Decided(decision),
            Err(failure) => {
                outbox.text(replies::GENERIC_FAILURE).await;
                TurnOutcome::Failed(failure)
            }
        }
    }

    async fn run_admitted(
        &self,
        turn: &CoalescedTurn,
        merchant: &MerchantProfile,
        outbox: &Outbox<'_>,
    ) -> Result<TurnDecision, ApplicationError> {
        let key = &turn.key;
        let correlation_id = turn.correlation_id();
        let text = turn.joined_text();
        outbox.action(SenderAction::MarkSeen).await;

        let customer_message = ChatMessage::customer(key.clone(), text.clone());
        self.history.append(customer_message).await.map_err(persistence)?;
        let now = Utc::now();
        let mut session = self
            .sessions
            .find(key)
            .await
            .map_err(persistence)?
            .unwrap_or_else(|| OrderSession::new(key.clone(), now));
        session.record_activity(now);

        let intent = intent::classify(&text);
        let history = self.history.recent(key, HISTORY_LIMIT).await.map_err(persistence)?;
        self.merge_extraction(&mut session, merchant, &history, intent, correlation_id).await;
        self.sessions.save(session.clone()).await.map_err(persistence)?;

        let context = TurnContext {
            cancellation_requested: intent::is_cancellation(&text),
            intent,
            missing_fields: session.missing_fields(),
            summary_shown: session.summary_shown,
            hybrid_mode: merchant.settings.hybrid_mode,
        };
        let audit = AuditContext::for_turn(turn, ACTOR);
        let decision = self.engine.decide_with_audit(&context, self.audit.as_ref(), &audit);
        info!(
            event_name = "workflow.turn.decided",
            correlation_id,
            merchant_id = %key.merchant_id.0,
            customer_id = %key.customer_id.0,
            intent = ?intent,
            decision = decision.label(),
            "turn decided"
        );

        match &decision {
            TurnDecision::Cancel => {
                self.sessions.delete(key).await.map_err(persistence)?;
                self.reply(outbox, replies::CANCELLED).await;
            }
            TurnDecision::ReportMissingFields(fields) => {
                self.reply(outbox, &replies::missing_fields(fields)).await;
            }
            TurnDecision::Finalize => {
                self.finalize(merchant, &session, outbox, &audit).await?;
            }
            TurnDecision::AcknowledgeDelay => {
                self.reply(outbox, replies::DELAY_ACKNOWLEDGED).await;
            }
            TurnDecision::AcknowledgeDeny => {
                self.sessions.delete(key).await.map_err(persistence)?;
                self.reply(outbox, replies::DENY_ACKNOWLEDGED).await;
            }
            TurnDecision::ShowSummary => {
                let catalog = self.load_catalog(merchant).await.map_err(persistence)?;
                let priced = price_items(&catalog, &session.items, session.delivery_charge);
                self.reply(outbox, &replies::order_summary(&session, &priced)).await;
                session.summary_shown = true;
                self.sessions.save(session).await.map_err(persistence)?;
            }
            TurnDecision::Delegate { reset_summary } => {
                if *reset_summary {
                    session.summary_shown = false;
                    self.sessions.save(session.clone()).await.map_err(persistence)?;
                }
                self.delegate(merchant, &session, &history, &text, outbox).await;
            }
        }

        Ok(decision)
    }

    async fn merge_extraction(
        &self,
        session: &mut OrderSession,
        merchant: &MerchantProfile,
        history: &[ChatMessage],
        intent: Intent,
        correlation_id: &str,
    ) {
        let extraction = match self.extractor.extract(merchant, history).await {
            Ok(Some(extraction)) => extraction,
            Ok(None) => {
                debug!(
                    event_name = "workflow.extraction.empty",
                    correlation_id, "no order fields extracted this turn"
                );
                return;
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.extraction.failed",
                    correlation_id,
                    error = %error,
                    "order extraction failed; session left unmerged"
                );
                return;
            }
        };

        let outcome = session.merge(&extraction, &merchant.identity(), intent == Intent::Confirm);
        if !outcome.ignored.is_empty() {
            let ignored = outcome.ignored.iter().map(|field| field.as_str()).collect::<Vec<_>>();
            debug!(
                event_name = "workflow.extraction.business_identity_ignored",
                correlation_id,
                fields = %ignored.join(","),
                "extracted fields matched the merchant's own details"
            );
        }
        debug!(
            event_name = "workflow.session.merged",
            correlation_id,
            changed = outcome.changed.len(),
            summary_reset = outcome.summary_reset,
            "extraction merged into session"
        );
    }

    async fn finalize(
        &self,
        merchant: &MerchantProfile,
        session: &OrderSession,
        outbox: &Outbox<'_>,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        let key = &session.key;
        let plan = match self.reserver.reserve(&merchant.id, &session.items).await {
            Ok(plan) => plan,
            Err(ReservationError::Rejected(failure)) => {
                let message = replies::reservation_problem(&failure);
                let failure = ApplicationError::from(ReservationError::Rejected(failure));
                let outcome = if failure.is_customer_visible() {
                    AuditOutcome::Rejected
                } else {
                    AuditOutcome::Failed
                };
                warn!(
                    event_name = "workflow.turn.reservation_rejected",
                    correlation_id = %audit.correlation_id,
                    merchant_id = %key.merchant_id.0,
                    customer_id = %key.customer_id.0,
                    reason = %failure,
                    "order not finalized"
                );
                let event_type = "stock.reservation_rejected";
                self.audit.emit(
                    AuditEvent::new(audit, event_type, AuditCategory::Inventory, outcome)
                        .with_metadata("reason", failure.to_string()),
                );
                self.reply(outbox, &message).await;
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        let priced = PricedOrder::from_lines(plan.lines.clone(), session.delivery_charge);
        let order = OrderRecord {
            id: OrderId::generate(),
            key: key.clone(),
            customer_name: session.name.clone().unwrap_or_default(),
            phone: session.phone.clone().unwrap_or_default(),
            address: session.address.clone().unwrap_or_default(),
            lines: priced.lines,
            subtotal: priced.subtotal,
            delivery_charge: priced.delivery_charge,
            total: priced.total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };

        if let Err(save_error) = self.orders.save(order.clone()).await {
            let restored = self.reserver.release(&merchant.id, &plan).await;
            error!(
                event_name = "workflow.turn.order_persist_failed",
                correlation_id = %audit.correlation_id,
                merchant_id = %key.merchant_id.0,
                customer_id = %key.customer_id.0,
                restored,
                error = %save_error,
                "order could not be saved; reserved stock released"
            );
            return Err(persistence(save_error));
        }

        if let Err(clear_error) = self.history.clear(key).await {
            warn!(
                correlation_id = %audit.correlation_id,
                error = %clear_error,
                "chat history not cleared"
            );
        }
        if let Err(delete_error) = self.sessions.delete(key).await {
            warn!(
                correlation_id = %audit.correlation_id,
                error = %delete_error,
                "session not deleted"
            );
        }

        info!(
            event_name = "workflow.turn.finalized",
            correlation_id = %audit.correlation_id,
            merchant_id = %key.merchant_id.0,
            customer_id = %key.customer_id.0,
            order_id = %order.id.0,
            total = %order.total,
            "order finalized"
        );
        let (category, outcome) = (AuditCategory::Persistence, AuditOutcome::Success);
        self.audit.emit(
            AuditEvent::new(audit, "order.finalized", category, outcome)
                .with_metadata("order_id", order.id.0.clone())
                .with_metadata("total", order.total.to_string()),
        );

        outbox.paced_text(&replies::order_confirmation(&order)).await;
        Ok(())
    }

    async fn delegate(
        &self,
        merchant: &MerchantProfile,
        session: &OrderSession,
        history: &[ChatMessage],
        text: &str,
        outbox: &Outbox<'_>,
    ) {
        let catalog = match self.load_catalog(merchant).await {
            Ok(catalog) => catalog,
            Err(catalog_error) => {
                warn!(
                    correlation_id = outbox.correlation_id,
                    error = %catalog_error,
                    "catalog unavailable for reply"
                );
                Catalog::default()
            }
        };

        let request = ReplyRequest { merchant, session, catalog: &catalog, history, text };
        let reply = match self.replies.generate(request).await {
            Ok(reply) => reply,
            Err(reply_error) => {
                warn!(
                    event_name = "workflow.reply.failed",
                    correlation_id = outbox.correlation_id,
                    error = %reply_error,
                    "reply generation failed; no reply this turn"
                );
                return;
            }
        };

        if reply.is_empty() {
            debug!(
                event_name = "workflow.reply.empty",
                correlation_id = outbox.correlation_id,
                "nothing to send"
            );
            return;
        }
        if let Some(text) = reply.text.as_deref() {
            self.reply(outbox, text).await;
        }
        if let Some(url) = reply.image_url.as_deref() {
            outbox.image(url).await;
        }
    }

    async fn load_catalog(&self, merchant: &MerchantProfile) -> Result<Catalog, RepositoryError> {
        Ok(Catalog::new(self.catalog.list_for_merchant(&merchant.id).await?))
    }

    /// Sends a paced reply and records it in the chat history.
    async fn reply(&self, outbox: &Outbox<'_>, text: &str) {
        outbox.paced_text(text).await;
        let message = ChatMessage::assistant(outbox.key.clone(), text);
        if let Err(history_error) = self.history.append(message).await {
            warn!(
                correlation_id = outbox.correlation_id,
                error = %history_error,
                "reply not recorded in history"
            );
        }
    }
}

#[async_trait]
impl TurnHandler for AgentRuntime {
    async fn handle_turn(&self, turn: CoalescedTurn) {
        match self.process_turn(&turn).await {
            TurnOutcome::Failed(failure) => {
                let interface = failure.clone().into_interface(turn.correlation_id());
                error!(
                    event_name = "workflow.turn.failed",
                    correlation_id = interface.correlation_id(),
                    merchant_id = %turn.key.merchant_id.0,
                    customer_id = %turn.key.customer_id.0,
                    failure_class = failure.class().as_str(),
                    error = %interface,
                    "turn failed"
                );
            }
            outcome => debug!(
                event_name = "workflow.turn.completed",
                correlation_id = turn.correlation_id(),
                outcome = ?outcome,
                "turn completed"
            ),
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Outbound delivery for one turn. Every call is fire-and-forget: failures are logged.
struct Outbox<'a> {
    messenger: &'a dyn Messenger,
    token: &'a SecretString,
    key: &'a ConversationKey,
    correlation_id: &'a str,
    pacing: Duration,
}

impl Outbox<'_> {
    async fn action(&self, action: SenderAction) {
        if let Err(delivery_error) =
            self.messenger.send_action(self.token, &self.key.customer_id, action).await
        {
            debug!(
                event_name = "delivery.action.failed",
                correlation_id = self.correlation_id,
                action = action.as_str(),
                error = %delivery_error,
                "sender action not delivered"
            );
        }
    }

    /// Typing indicator, then the merchant's configured reply delay, then the text.
    async fn paced_text(&self, text: &str) {
        self.action(SenderAction::TypingOn).await;
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        self.text(text).await;
    }

    async fn text(&self, text: &str) {
        match self.messenger.send_text(self.token, &self.key.customer_id, text).await {
            Ok(()) => debug!(
                event_name = "delivery.message.sent",
                correlation_id = self.correlation_id,
                customer_id = %self.key.customer_id.0,
                "reply delivered"
            ),
            Err(delivery_error) => warn!(
                event_name = "delivery.message.failed",
                correlation_id = self.correlation_id,
                customer_id = %self.key.customer_id.0,
                error = %delivery_error,
                "reply not delivered"
            ),
        }
    }

    async fn image(&self, url: &str) {
        if let Err(delivery_error) =
            self.messenger.send_image(self.token, &self.key.customer_id, url).await
        {
            warn!(
                event_name = "delivery.image.failed",
                correlation_id = self.correlation_id,
                customer_id = %self.key.customer_id.0,
                error = %delivery_error,
                "image not delivered"
            );
        }
    }
}
