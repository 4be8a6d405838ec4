use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page (merchant) identifier as issued by the messaging platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MerchantId(pub String);

/// Page-scoped customer identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// The (merchant, customer) pair that scopes debouncing and the order session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub merchant_id: MerchantId,
    pub customer_id: CustomerId,
}

impl ConversationKey {
    pub fn new(merchant_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            merchant_id: MerchantId(merchant_id.into()),
            customer_id: CustomerId(customer_id.into()),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.merchant_id.0, self.customer_id.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub key: ConversationKey,
    pub event_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// All messages one customer sent within a single quiet window, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescedTurn {
    pub key: ConversationKey,
    pub event_ids: Vec<String>,
    pub texts: Vec<String>,
}

impl CoalescedTurn {
    pub fn joined_text(&self) -> String {
        self.texts.join(" ")
    }

    /// The first event id of the turn doubles as its correlation id in logs.
    pub fn correlation_id(&self) -> &str {
        self.event_ids.first().map(String::as_str).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::{CoalescedTurn, ConversationKey};

    #[test]
    fn joined_text_preserves_arrival_order() {
        let turn = CoalescedTurn {
            key: ConversationKey::new("page-1", "psid-1"),
            event_ids: vec!["m1".to_string(), "m2".to_string()],
            texts: vec!["amar naam Rahim".to_string(), "01711000000".to_string()],
        };

        assert_eq!(turn.joined_text(), "amar naam Rahim 01711000000");
        assert_eq!(turn.correlation_id(), "m1");
        assert_eq!(turn.key.to_string(), "page-1:psid-1");
    }
}
