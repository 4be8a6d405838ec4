use std::time::Duration;

use async_trait::async_trait;
use dokan_core::domain::conversation::CustomerId;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderAction {
    MarkSeen,
    TypingOn,
    TypingOff,
}

impl SenderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkSeen => "mark_seen",
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery client could not be built: {0}")]
    Client(String),
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messaging api rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound calls to the messaging platform. Callers treat every failure as log-and-continue.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        text: &str,
    ) -> Result<(), DeliveryError>;

    async fn send_image(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        url: &str,
    ) -> Result<(), DeliveryError>;

    async fn send_action(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        action: SenderAction,
    ) -> Result<(), DeliveryError>;
}

/// Send API client: `POST {api_base_url}/me/messages?access_token=...`.
#[derive(Clone)]
pub struct GraphMessenger {
    api_base_url: String,
    client: reqwest::Client,
}

impl GraphMessenger {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DeliveryError::Client(error.to_string()))?;
        Ok(Self { api_base_url: api_base_url.trim_end_matches('/').to_string(), client })
    }

    async fn post(&self, token: &SecretString, body: Value) -> Result<(), DeliveryError> {
        let url = format!("{}/me/messages", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token.expose_secret())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for GraphMessenger {
    async fn send_text(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.post(token, text_body(recipient, text)).await
    }

    async fn send_image(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        url: &str,
    ) -> Result<(), DeliveryError> {
        self.post(token, image_body(recipient, url)).await
    }

    async fn send_action(
        &self,
        token: &SecretString,
        recipient: &CustomerId,
        action: SenderAction,
    ) -> Result<(), DeliveryError> {
        self.post(token, action_body(recipient, action)).await
    }
}

fn text_body(recipient: &CustomerId, text: &str) -> Value {
    json!({
        "recipient": { "id": recipient.0 },
        "messaging_type": "RESPONSE",
        "message": { "text": text },
    })
}

fn image_body(recipient: &CustomerId, url: &str) -> Value {
    json!({
        "recipient": { "id": recipient.0 },
        "messaging_type": "RESPONSE",
        "message": {
            "attachment": { "type": "image", "payload": { "url": url, "is_reusable": true } }
        },
    })
}

fn action_body(recipient: &CustomerId, action: SenderAction) -> Value {
    json!({
        "recipient": { "id": recipient.0 },
        "sender_action": action.as_str(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Text(String),
    Image(String),
    Action(SenderAction),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub recipient: CustomerId,
    pub delivery: Delivery,
}

/// Keeps every delivery in memory instead of calling the platform.
#[derive(Default)]
pub struct RecordingMessenger {
    deliveries: Mutex<Vec<RecordedDelivery>>,
    failing: Mutex<bool>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsequent deliveries are recorded and then reported as rejected.
    pub async fn fail_deliveries(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    pub async fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .await
            .iter()
            .filter_map(|recorded| match &recorded.delivery {
                Delivery::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(
        &self,
        recipient: &CustomerId,
        delivery: Delivery,
    ) -> Result<(), DeliveryError> {
        self.deliveries
            .lock()
            .await
            .push(RecordedDelivery { recipient: recipient.clone(), delivery });
        if *self.failing.lock().await {
            return Err(DeliveryError::Rejected { status: 503, body: "unavailable".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        _token: &SecretString,
        recipient: &CustomerId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.record(recipient, Delivery::Text(text.to_string())).await
    }

    async fn send_image(
        &self,
        _token: &SecretString,
        recipient: &CustomerId,
        url: &str,
    ) -> Result<(), DeliveryError> {
        self.record(recipient, Delivery::Image(url.to_string())).await
    }

    async fn send_action(
        &self,
        _token: &SecretString,
        recipient: &CustomerId,
        action: SenderAction,
    ) -> Result<(), DeliveryError> {
        self.record(recipient, Delivery::Action(action)).await
    }
}
