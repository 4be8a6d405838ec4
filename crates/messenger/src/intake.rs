use dokan_core::domain::conversation::InboundEvent;
use serde::Serialize;
use tracing::{debug, info};

use crate::debounce::Coalescer;
use crate::dedup::Deduplicator;
use crate::events::WebhookBatch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    Buffered,
    Duplicate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSummary {
    pub buffered: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// The path every inbound event takes: duplicate check first, then the debounce buffer.
pub struct MessageIntake {
    dedup: Deduplicator,
    coalescer: Coalescer,
}

impl MessageIntake {
    pub fn new(dedup: Deduplicator, coalescer: Coalescer) -> Self {
        Self { dedup, coalescer }
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    pub fn accept(&self, event: InboundEvent) -> IntakeOutcome {
        if self.dedup.seen(&event.event_id) {
            debug!(
                event_name = "ingress.webhook.duplicate_dropped",
                correlation_id = %event.event_id,
                merchant_id = %event.key.merchant_id.0,
                customer_id = %event.key.customer_id.0,
                "dropping redelivered event"
            );
            return IntakeOutcome::Duplicate;
        }

        info!(
            event_name = "ingress.webhook.event_received",
            correlation_id = %event.event_id,
            merchant_id = %event.key.merchant_id.0,
            customer_id = %event.key.customer_id.0,
            "received customer message"
        );
        self.coalescer.push(event);
        IntakeOutcome::Buffered
    }

    pub fn accept_batch(&self, batch: WebhookBatch) -> IntakeSummary {
        let mut summary =
            IntakeSummary { skipped: batch.skipped.len(), ..IntakeSummary::default() };
        for event in batch.events {
            match self.accept(event) {
                IntakeOutcome::Buffered => summary.buffered += 1,
                IntakeOutcome::Duplicate => summary.duplicates += 1,
            }
        }
        summary
    }
}
