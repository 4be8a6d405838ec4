use serde::{Deserialize, Serialize};

use crate::domain::session::SessionField;
use crate::intent::Intent;

/// Inputs that decide whether a turn is processed at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnGate {
    pub subscription_active: bool,
    pub ai_reply_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SilentReason {
    SubscriptionInactive,
    RepliesDisabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    Proceed,
    Silent(SilentReason),
}

/// Everything the per-turn decision depends on, captured after the extraction merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    pub cancellation_requested: bool,
    pub intent: Intent,
    pub missing_fields: Vec<SessionField>,
    pub summary_shown: bool,
    pub hybrid_mode: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDecision {
    /// Delete the session and acknowledge the cancellation.
    Cancel,
    /// Customer confirmed but the order is incomplete.
    ReportMissingFields(Vec<SessionField>),
    /// Reserve stock, persist the order and clear the conversation.
    Finalize,
    AcknowledgeDelay,
    /// Acknowledge and drop the session.
    AcknowledgeDeny,
    ShowSummary,
    /// Hand the turn to the reply generator.
    Delegate { reset_summary: bool },
}

impl TurnDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::ReportMissingFields(_) => "report_missing_fields",
            Self::Finalize => "finalize",
            Self::AcknowledgeDelay => "acknowledge_delay",
            Self::AcknowledgeDeny => "acknowledge_deny",
            Self::ShowSummary => "show_summary",
            Self::Delegate { .. } => "delegate",
        }
    }
}
