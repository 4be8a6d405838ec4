pub mod audit;
pub mod commerce;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod intent;

pub use commerce::{Catalog, PricedOrder, ReservationFailure, ReservationPlan, StockMutation};
pub use domain::chat::{ChatMessage, ChatRole};
pub use domain::conversation::{
    CoalescedTurn, ConversationKey, CustomerId, InboundEvent, MerchantId,
};
pub use domain::merchant::{BotSettings, MerchantProfile};
pub use domain::order::{OrderId, OrderLine, OrderRecord, OrderStatus};
pub use domain::product::{CatalogProduct, ProductId};
pub use domain::session::{
    BusinessIdentity, Extraction, LineItem, MergeOutcome, OrderSession, SessionField,
};
pub use errors::{ApplicationError, DomainError, FailureClass, InterfaceError};
pub use flows::{TurnContext, TurnDecision, TurnEngine};
pub use intent::Intent;
