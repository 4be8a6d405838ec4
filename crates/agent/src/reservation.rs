use std::sync::Arc;

use dokan_core::commerce::catalog::Catalog;
use dokan_core::commerce::inventory::{
    plan_reservation, MutationOutcome, ReservationFailure, ReservationPlan, StockMutation,
};
use dokan_core::domain::conversation::MerchantId;
use dokan_core::domain::session::LineItem;
use dokan_core::errors::{ApplicationError, DomainError};
use dokan_db::repositories::{CatalogRepository, RepositoryError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error(transparent)]
    Rejected(#[from] ReservationFailure),
    #[error("catalog could not be loaded: {0}")]
    Catalog(#[from] RepositoryError),
}

impl From<ReservationError> for ApplicationError {
    fn from(value: ReservationError) -> Self {
        match value {
            ReservationError::Rejected(failure) => DomainError::Reservation(failure).into(),
            ReservationError::Catalog(error) => Self::Persistence(error.to_string()),
        }
    }
}

/// Validates an order against live stock and takes the stock one product at a time.
///
/// Validation covers the whole order before anything is written. Each write is a conditional
/// decrement, so an order that loses a race for the last units is rejected as a stock
/// conflict instead of overselling. If a write fails or loses a race, the units already taken
/// are given back and the reservation is reported failed.
pub struct StockReserver {
    catalog: Arc<dyn CatalogRepository>,
}

impl StockReserver {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    pub async fn reserve(
        &self,
        merchant_id: &MerchantId,
        items: &[LineItem],
    ) -> Result<ReservationPlan, ReservationError> {
        let catalog = Catalog::new(self.catalog.list_for_merchant(merchant_id).await?);
        let plan = plan_reservation(&catalog, items)?;

        let mut applied = Vec::with_capacity(plan.mutations.len());
        let mut outcomes = Vec::with_capacity(plan.mutations.len());
        for mutation in &plan.mutations {
            match self.catalog.decrement_stock(&mutation.product_id, mutation.quantity).await {
                Ok(true) => {
                    applied.push(mutation);
                    outcomes.push(MutationOutcome {
                        product_name: mutation.product_name.clone(),
                        succeeded: true,
                        detail: None,
                    });
                }
                Ok(false) => {
                    info!(
                        event_name = "inventory.stock.taken_concurrently",
                        merchant_id = %merchant_id.0,
                        product_id = %mutation.product_id.0,
                        quantity = mutation.quantity,
                        "stock changed between validation and reservation"
                    );
                    self.restore(merchant_id, applied).await;
                    return Err(self.conflict_after_race(merchant_id, items, mutation).await);
                }
                Err(error) => {
                    warn!(
                        event_name = "inventory.stock.write_failed",
                        merchant_id = %merchant_id.0,
                        product_id = %mutation.product_id.0,
                        error = %error,
                        "stock decrement failed"
                    );
                    outcomes.push(MutationOutcome {
                        product_name: mutation.product_name.clone(),
                        succeeded: false,
                        detail: Some(error.to_string()),
                    });
                }
            }
        }

        if applied.len() < plan.mutations.len() {
            self.restore(merchant_id, applied).await;
            return Err(ReservationFailure::MutationFailed { outcomes }.into());
        }

        info!(
            event_name = "inventory.stock.reserved",
            merchant_id = %merchant_id.0,
            products = plan.mutations.len(),
            "stock reserved"
        );
        Ok(plan)
    }

    /// Gives back a reservation whose order could not be recorded.
    pub async fn release(&self, merchant_id: &MerchantId, plan: &ReservationPlan) -> usize {
        self.restore(merchant_id, plan.mutations.iter().collect()).await
    }

    /// Re-validates against the stock left by the competing order so the customer hears
    /// which products fell short.
    async fn conflict_after_race(
        &self,
        merchant_id: &MerchantId,
        items: &[LineItem],
        lost: &StockMutation,
    ) -> ReservationError {
        if let Ok(products) = self.catalog.list_for_merchant(merchant_id).await {
            if let Err(failure) = plan_reservation(&Catalog::new(products), items) {
                return failure.into();
            }
        }
        ReservationFailure::StockConflict {
            out_of_stock: vec![lost.product_name.clone()],
            insufficient: Vec::new(),
        }
        .into()
    }

    async fn restore(&self, merchant_id: &MerchantId, mutations: Vec<&StockMutation>) -> usize {
        let mut restored = 0;
        for mutation in mutations {
            match self.catalog.increment_stock(&mutation.product_id, mutation.quantity).await {
                Ok(()) => restored += 1,
                Err(error) => warn!(
                    event_name = "inventory.stock.restore_failed",
                    merchant_id = %merchant_id.0,
                    product_id = %mutation.product_id.0,
                    quantity = mutation.quantity,
                    error = %error,
                    "could not restore stock; manual reconciliation needed"
                ),
            }
        }
        restored
    }
}
