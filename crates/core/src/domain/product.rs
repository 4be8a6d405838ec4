use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::MerchantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
    pub in_stock: bool,
}

impl CatalogProduct {
    /// `in_stock == false` and `stock == 0` both mean the product cannot be sold.
    pub fn is_sellable(&self) -> bool {
        self.in_stock && self.stock > 0
    }

    /// Stock reaching zero forces `in_stock` off; the reverse is left to the merchant.
    pub fn set_stock(&mut self, stock: u32) {
        self.stock = stock;
        if stock == 0 {
            self.in_stock = false;
        }
    }
}
