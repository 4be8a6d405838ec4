use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Customer,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "assistant" => Self::Assistant,
            _ => Self::Customer,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub key: ConversationKey,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn customer(key: ConversationKey, content: impl Into<String>) -> Self {
        Self { key, role: ChatRole::Customer, content: content.into(), created_at: Utc::now() }
    }

    pub fn assistant(key: ConversationKey, content: impl Into<String>) -> Self {
        Self { key, role: ChatRole::Assistant, content: content.into(), created_at: Utc::now() }
    }
}
