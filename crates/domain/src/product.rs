//! Catalog product as seen by checkout.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A sellable product.
///
/// `stock_quantity` is unsigned, so a negative stock level cannot be
/// represented; the store rejects any decrement that would go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub active: bool,
}

impl Product {
    /// Creates an active product.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock_quantity,
            active: true,
        }
    }

    /// Returns a copy of the product marked inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns true if the product is active and has at least `quantity`
    /// units in stock according to the last known stock level.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.active && quantity <= self.stock_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_supply_within_stock() {
        let product = Product::new("SKU-001", "Widget", Money::from_minor(1000), 5);
        assert!(product.can_supply(5));
        assert!(!product.can_supply(6));
    }

    #[test]
    fn test_inactive_product_supplies_nothing() {
        let product = Product::new("SKU-001", "Widget", Money::from_minor(1000), 5).deactivated();
        assert!(!product.can_supply(1));
    }
}
