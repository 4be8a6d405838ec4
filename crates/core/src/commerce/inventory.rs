use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commerce::catalog::Catalog;
use crate::domain::order::OrderLine;
use crate::domain::product::ProductId;
use crate::domain::session::LineItem;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_name: String,
    pub requested: u32,
    pub available: u32,
}

/// One product's share of a reservation. The write takes `quantity` relative to whatever is
/// stored; `previous_stock` and `new_stock` record the levels seen at validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub previous_stock: u32,
    pub new_stock: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub product_name: String,
    pub succeeded: bool,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPlan {
    pub lines: Vec<OrderLine>,
    pub mutations: Vec<StockMutation>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationFailure {
    #[error("product not found in catalog: {name}")]
    ProductNotFound { name: String },
    #[error("stock conflict: {}", StockConflictSummary(.out_of_stock, .insufficient))]
    StockConflict { out_of_stock: Vec<String>, insufficient: Vec<StockShortfall> },
    #[error("stock update failed for {} item(s)", failed_count(.outcomes))]
    MutationFailed { outcomes: Vec<MutationOutcome> },
}

struct StockConflictSummary<'a>(&'a [String], &'a [StockShortfall]);

impl fmt::Display for StockConflictSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts =
            self.0.iter().map(|name| format!("{name} out of stock")).collect::<Vec<_>>();
        parts.extend(self.1.iter().map(|shortfall| {
            format!(
                "{} requested {} available {}",
                shortfall.product_name, shortfall.requested, shortfall.available
            )
        }));
        f.write_str(&parts.join("; "))
    }
}

fn failed_count(outcomes: &[MutationOutcome]) -> usize {
    outcomes.iter().filter(|outcome| !outcome.succeeded).count()
}

/// Validates every line item against the catalog and returns the stock writes that would
/// reserve them. Unknown products fail immediately; stock problems are collected across
/// the whole order so they can be reported together.
pub fn plan_reservation(
    catalog: &Catalog,
    items: &[LineItem],
) -> Result<ReservationPlan, ReservationFailure> {
    let mut lines = Vec::with_capacity(items.len());
    let mut demand: Vec<(ProductId, u32)> = Vec::new();
    let mut demand_index: HashMap<ProductId, usize> = HashMap::new();

    for item in items {
        let Some(product) = catalog.match_name(&item.product_name) else {
            return Err(ReservationFailure::ProductNotFound { name: item.product_name.clone() });
        };

        lines.push(OrderLine {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity: item.quantity,
            unit_price: product.price,
        });

        match demand_index.get(&product.id) {
            Some(&index) => demand[index].1 = demand[index].1.saturating_add(item.quantity),
            None => {
                demand_index.insert(product.id.clone(), demand.len());
                demand.push((product.id.clone(), item.quantity));
            }
        }
    }

    let mut out_of_stock = Vec::new();
    let mut insufficient = Vec::new();
    let mut mutations = Vec::with_capacity(demand.len());

    for (product_id, requested) in demand {
        let Some(product) = catalog.find(&product_id) else {
            continue;
        };

        if !product.is_sellable() {
            out_of_stock.push(product.name.clone());
        } else if product.stock < requested {
            insufficient.push(StockShortfall {
                product_name: product.name.clone(),
                requested,
                available: product.stock,
            });
        } else {
            mutations.push(StockMutation {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: requested,
                previous_stock: product.stock,
                new_stock: product.stock.saturating_sub(requested),
            });
        }
    }

    if !out_of_stock.is_empty() || !insufficient.is_empty() {
        return Err(ReservationFailure::StockConflict { out_of_stock, insufficient });
    }

    Ok(ReservationPlan { lines, mutations })
}
