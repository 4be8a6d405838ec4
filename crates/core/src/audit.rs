//! Decision trail for conversation turns.
//!
//! Each event names the conversation it belongs to and carries the turn's correlation id,
//! so the trail lines up with the tracing output for the same turn.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::conversation::{CoalescedTurn, ConversationKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Flow,
    Inventory,
    Persistence,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Inventory => "inventory",
            Self::Persistence => "persistence",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// The customer asked for something the shop could not do, e.g. more stock than exists.
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditContext {
    pub conversation: ConversationKey,
    pub correlation_id: String,
    pub actor: &'static str,
}

impl AuditContext {
    pub fn new(
        conversation: ConversationKey,
        correlation_id: impl Into<String>,
        actor: &'static str,
    ) -> Self {
        Self { conversation, correlation_id: correlation_id.into(), actor }
    }

    pub fn for_turn(turn: &CoalescedTurn, actor: &'static str) -> Self {
        Self::new(turn.key.clone(), turn.correlation_id(), actor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub conversation: ConversationKey,
    pub correlation_id: String,
    pub event_type: &'static str,
    pub category: AuditCategory,
    pub actor: &'static str,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<&'static str, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: &'static str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            conversation: context.conversation.clone(),
            correlation_id: context.correlation_id.clone(),
            event_type,
            category,
            actor: context.actor,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.lock().iter().map(|event| event.event_type).collect()
    }

    /// Most recent event of the given type.
    pub fn last_of(&self, event_type: &str) -> Option<AuditEvent> {
        self.lock().iter().rev().find(|event| event.event_type == event_type).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.lock().push(event);
    }
}
