use dokan_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Writes audit events to the log stream, one structured line per event.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        let merchant_id = event.conversation.merchant_id.0.as_str();
        let customer_id = event.conversation.customer_id.0.as_str();

        if event.outcome == AuditOutcome::Success {
            info!(
                event_name = "audit.event",
                correlation_id = %event.correlation_id,
                audit_type = event.event_type,
                category = event.category.as_str(),
                actor = event.actor,
                merchant_id,
                customer_id,
                metadata = %metadata,
                "audit"
            );
        } else {
            warn!(
                event_name = "audit.event",
                correlation_id = %event.correlation_id,
                audit_type = event.event_type,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = event.actor,
                merchant_id,
                customer_id,
                metadata = %metadata,
                "audit"
            );
        }
    }
}
