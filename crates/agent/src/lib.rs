//! Agent runtime: the per-turn workflow behind a merchant's messaging page.
//!
//! The debounce layer in `dokan-messenger` hands every coalesced turn to
//! [`AgentRuntime`], which:
//! 1. Checks whether the merchant may reply at all (subscription, AI switch)
//! 2. Merges the model's order extraction into the persisted order session
//! 3. Asks the deterministic [`TurnEngine`](dokan_core::flows::TurnEngine) for a decision
//! 4. Carries out that decision: replies, stock reservation, order persistence
//!
//! # Safety Principle
//!
//! The model is strictly a translator. It never decides prices, stock or whether an
//! order is placed; those come from `dokan-core` and the repositories.

pub mod conversation;
pub mod followup;
pub mod llm;
pub mod replies;
pub mod reservation;
pub mod runtime;

pub use conversation::{
    GeneratedReply, LlmOrderExtractor, LlmReplyGenerator, OrderExtractor, ReplyGenerator,
    ReplyRequest,
};
pub use followup::{FollowupSweeper, SweepReport};
pub use llm::{client_from_config, LlmClient, LlmError, PromptMessage, PromptRole};
pub use reservation::{ReservationError, StockReserver};
pub use runtime::{AgentDependencies, AgentRuntime, TurnOutcome, HISTORY_LIMIT};
