use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{Admission, SilentReason, TurnContext, TurnDecision, TurnGate};
use crate::intent::Intent;

/// Fixed-precedence decision table for one coalesced turn.
///
/// The engine is pure: callers gather the inputs (merged session, classified intent,
/// merchant settings), ask for a decision and then perform its side effects.
#[derive(Clone, Debug, Default)]
pub struct TurnEngine;

impl TurnEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn admit(&self, gate: &TurnGate) -> Admission {
        if !gate.subscription_active {
            Admission::Silent(SilentReason::SubscriptionInactive)
        } else if !gate.ai_reply_enabled {
            Admission::Silent(SilentReason::RepliesDisabled)
        } else {
            Admission::Proceed
        }
    }

    pub fn decide(&self, context: &TurnContext) -> TurnDecision {
        if context.cancellation_requested {
            return TurnDecision::Cancel;
        }

        match context.intent {
            Intent::Confirm if !context.missing_fields.is_empty() => {
                TurnDecision::ReportMissingFields(context.missing_fields.clone())
            }
            Intent::Confirm => TurnDecision::Finalize,
            Intent::Delay => TurnDecision::AcknowledgeDelay,
            Intent::Deny => TurnDecision::AcknowledgeDeny,
            Intent::Neutral if context.missing_fields.is_empty() && !context.summary_shown => {
                TurnDecision::ShowSummary
            }
            Intent::Neutral => TurnDecision::Delegate {
                reset_summary: context.hybrid_mode && context.summary_shown,
            },
        }
    }

    pub fn decide_with_audit<S>(
        &self,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> TurnDecision
    where
        S: AuditSink + ?Sized,
    {
        let decision = self.decide(context);
        let mut event =
            AuditEvent::new(audit, "turn.decided", AuditCategory::Flow, AuditOutcome::Success)
                .with_metadata("decision", decision.label())
                .with_metadata("intent", format!("{:?}", context.intent));
        if let TurnDecision::ReportMissingFields(fields) = &decision {
            let names = fields.iter().map(|field| field.as_str()).collect::<Vec<_>>();
            event = event.with_metadata("missing_fields", names.join(","));
        }
        sink.emit(event);
        decision
    }
}
