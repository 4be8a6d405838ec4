pub mod engine;
pub mod states;

pub use engine::TurnEngine;
pub use states::{Admission, SilentReason, TurnContext, TurnDecision, TurnGate};
