use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationKey;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_name: String,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionField {
    Name,
    Phone,
    Address,
    Items,
}

impl SessionField {
    pub const REQUIRED: [SessionField; 4] =
        [SessionField::Name, SessionField::Phone, SessionField::Address, SessionField::Items];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Items => "items",
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured order fields pulled out of the conversation by the extraction collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<LineItem>>,
    #[serde(default)]
    pub delivery_charge: Option<Decimal>,
}

/// The merchant's own contact details. Extracted customer fields that contain them are
/// assumed to be the model echoing business info and are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusinessIdentity {
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl BusinessIdentity {
    fn owns_address(&self, candidate: &str) -> bool {
        match self.address.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => {
                candidate.to_lowercase().contains(&address.to_lowercase())
            }
            _ => false,
        }
    }

    fn owns_phone(&self, candidate: &str) -> bool {
        let business_digits = self.phone.as_deref().map(digits_only).unwrap_or_default();
        if business_digits.is_empty() {
            return false;
        }
        digits_only(candidate).contains(&business_digits)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: Vec<SessionField>,
    /// Fields dropped because they matched the merchant's own identity.
    pub ignored: Vec<SessionField>,
    pub delivery_charge_updated: bool,
    pub summary_reset: bool,
}

impl MergeOutcome {
    pub fn data_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSession {
    pub key: ConversationKey,
    pub step: u32,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub items: Vec<LineItem>,
    pub delivery_charge: Decimal,
    pub summary_shown: bool,
    pub followup_sent: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl OrderSession {
    pub fn new(key: ConversationKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            step: 0,
            name: None,
            phone: None,
            address: None,
            items: Vec::new(),
            delivery_charge: Decimal::ZERO,
            summary_shown: false,
            followup_sent: false,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// The customer was heard from: bump the step counter and cancel any pending nudge.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.step = self.step.saturating_add(1);
        self.last_activity_at = now;
        self.followup_sent = false;
    }

    pub fn merge(
        &mut self,
        extraction: &Extraction,
        business: &BusinessIdentity,
        turn_is_confirmation: bool,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if let Some(name) = non_empty(extraction.name.as_deref()) {
            if self.name.as_deref() != Some(name) {
                self.name = Some(name.to_string());
                outcome.changed.push(SessionField::Name);
            }
        }

        if let Some(phone) = non_empty(extraction.phone.as_deref()) {
            if business.owns_phone(phone) {
                outcome.ignored.push(SessionField::Phone);
            } else if self.phone.as_deref() != Some(phone) {
                self.phone = Some(phone.to_string());
                outcome.changed.push(SessionField::Phone);
            }
        }

        if let Some(address) = non_empty(extraction.address.as_deref()) {
            if business.owns_address(address) {
                outcome.ignored.push(SessionField::Address);
            } else if self.address.as_deref() != Some(address) {
                self.address = Some(address.to_string());
                outcome.changed.push(SessionField::Address);
            }
        }

        if let Some(items) = extraction.items.as_ref().filter(|items| !items.is_empty()) {
            if &self.items != items {
                self.items = items.clone();
                outcome.changed.push(SessionField::Items);
            }
        }

        if let Some(charge) = extraction.delivery_charge {
            self.delivery_charge = charge;
            outcome.delivery_charge_updated = true;
        }

        if outcome.data_changed() && !turn_is_confirmation && self.summary_shown {
            self.summary_shown = false;
            outcome.summary_reset = true;
        }

        outcome
    }

    pub fn missing_fields(&self) -> Vec<SessionField> {
        SessionField::REQUIRED
            .into_iter()
            .filter(|field| match field {
                SessionField::Name => non_empty(self.name.as_deref()).is_none(),
                SessionField::Phone => non_empty(self.phone.as_deref()).is_none(),
                SessionField::Address => non_empty(self.address.as_deref()).is_none(),
                SessionField::Items => self.items.is_empty(),
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}
