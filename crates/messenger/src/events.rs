use chrono::{DateTime, Utc};
use dokan_core::domain::conversation::{ConversationKey, InboundEvent};
use serde::Deserialize;
use thiserror::Error;

const PAGE_OBJECT: &str = "page";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("webhook body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported webhook object `{0}`")]
    UnsupportedObject(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub recipient: Option<Participant>,
    pub timestamp: Option<i64>,
    pub message: Option<MessageBody>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageBody {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Echo,
    NotAMessage,
    NoText,
    NoEventId,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::NotAMessage => "not_a_message",
            Self::NoText => "no_text",
            Self::NoEventId => "no_event_id",
        }
    }
}

/// Customer text messages found in one webhook delivery, plus what was left out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WebhookBatch {
    pub events: Vec<InboundEvent>,
    pub skipped: Vec<SkipReason>,
}

pub fn parse_webhook(body: &[u8]) -> Result<WebhookBatch, PayloadError> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    payload.into_batch()
}

impl WebhookPayload {
    /// Delivery and read receipts arrive as messaging entries without a `message` body;
    /// they are skipped along with the page's own echoes and attachment-only messages.
    pub fn into_batch(self) -> Result<WebhookBatch, PayloadError> {
        if self.object != PAGE_OBJECT {
            return Err(PayloadError::UnsupportedObject(self.object));
        }

        let mut batch = WebhookBatch::default();
        for entry in self.entry {
            for messaging in entry.messaging {
                match to_inbound_event(&entry.id, messaging) {
                    Ok(event) => batch.events.push(event),
                    Err(reason) => batch.skipped.push(reason),
                }
            }
        }
        Ok(batch)
    }
}

fn to_inbound_event(page_id: &str, messaging: MessagingEvent) -> Result<InboundEvent, SkipReason> {
    let message = messaging.message.ok_or(SkipReason::NotAMessage)?;
    if message.is_echo {
        return Err(SkipReason::Echo);
    }

    let text = message
        .text
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(SkipReason::NoText)?;
    let event_id = message.mid.filter(|mid| !mid.is_empty()).ok_or(SkipReason::NoEventId)?;

    let merchant_id = messaging
        .recipient
        .map(|recipient| recipient.id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| page_id.to_string());
    let received_at = messaging
        .timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Ok(InboundEvent {
        key: ConversationKey::new(merchant_id, messaging.sender.id),
        event_id,
        text,
        received_at,
    })
}
