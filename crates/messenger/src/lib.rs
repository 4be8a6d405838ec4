//! Messaging-platform edge for dokan.
//!
//! - **Events** (`events`) - page webhook payloads decoded into `InboundEvent`s
//! - **Dedup** (`dedup`) - drops redelivered event ids within a TTL
//! - **Debounce** (`debounce`) - coalesces a burst of messages into one turn per conversation
//! - **Intake** (`intake`) - dedup then debounce, the path every webhook event takes
//! - **Outbound** (`outbound`) - text, image and sender-action delivery
//!
//! ```text
//! POST /webhook → events → Deduplicator → Coalescer ──(quiet window)──→ TurnHandler
//!                                                                          ↓
//!                                                              Messenger (Graph API)
//! ```

pub mod debounce;
pub mod dedup;
pub mod events;
pub mod intake;
pub mod outbound;

pub use debounce::{Coalescer, TurnHandler};
pub use dedup::Deduplicator;
pub use events::{parse_webhook, PayloadError, SkipReason, WebhookBatch};
pub use intake::{IntakeOutcome, IntakeSummary, MessageIntake};
pub use outbound::{
    Delivery, DeliveryError, GraphMessenger, Messenger, RecordedDelivery, RecordingMessenger,
    SenderAction,
};
