use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commerce::catalog::Catalog;
use crate::domain::order::OrderLine;
use crate::domain::session::LineItem;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub lines: Vec<OrderLine>,
    /// Requested items with no catalog match; they carry no price.
    pub unresolved: Vec<LineItem>,
    pub subtotal: Decimal,
    pub delivery_charge: Decimal,
    pub total: Decimal,
}

impl PricedOrder {
    pub fn from_lines(lines: Vec<OrderLine>, delivery_charge: Decimal) -> Self {
        let subtotal = lines.iter().map(OrderLine::line_total).sum::<Decimal>();
        Self {
            lines,
            unresolved: Vec::new(),
            subtotal,
            delivery_charge,
            total: subtotal + delivery_charge,
        }
    }
}

/// total = sum(matched price * quantity) + delivery charge
pub fn price_items(catalog: &Catalog, items: &[LineItem], delivery_charge: Decimal) -> PricedOrder {
    let mut lines = Vec::new();
    let mut unresolved = Vec::new();

    for item in items {
        match catalog.match_name(&item.product_name) {
            Some(product) => lines.push(OrderLine {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: item.quantity,
                unit_price: product.price,
            }),
            None => unresolved.push(item.clone()),
        }
    }

    PricedOrder { unresolved, ..PricedOrder::from_lines(lines, delivery_charge) }
}
