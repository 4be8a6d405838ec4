pub mod catalog;
pub mod inventory;
pub mod pricing;

pub use catalog::Catalog;
pub use inventory::{
    plan_reservation, MutationOutcome, ReservationFailure, ReservationPlan, StockMutation,
    StockShortfall,
};
pub use pricing::{price_items, PricedOrder};
