use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::product::Product;

/// A line of an order, frozen at creation time.
///
/// `unit_price` and `product_name` are copied from the catalog when the order
/// is placed, so later catalog changes never affect an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    product_id: ProductId,
    product_name: String,
    quantity: u32,
    unit_price: Money,
    /// Always `unit_price * quantity`.
    subtotal: Money,
}

impl OrderItem {
    /// Snapshots `quantity` units of a product at its current price.
    pub fn snapshot(product: &Product, quantity: u32) -> Result<Self, OrderError> {
        Self::new(
            product.id.clone(),
            product.name.clone(),
            quantity,
            product.price,
        )
    }

    /// Creates a line item, computing its subtotal.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, OrderError> {
        let product_id = product_id.into();
        if quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id,
                quantity,
            });
        }

        let subtotal = unit_price
            .checked_mul(quantity)
            .ok_or(OrderError::AmountOverflow)?;

        Ok(Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal,
        })
    }

    /// Rebuilds a persisted line as stored, subtotal included.
    ///
    /// The subtotal is checked when the owning order is rebuilt with
    /// `Order::from_record`.
    pub fn from_stored(
        product_id: ProductId,
        product_name: String,
        quantity: u32,
        unit_price: Money,
        subtotal: Money,
    ) -> Self {
        Self {
            product_id,
            product_name,
            quantity,
            unit_price,
            subtotal,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// Checks that a stored line still satisfies `subtotal == unit_price * quantity`.
    pub(crate) fn verify(&self) -> Result<(), OrderError> {
        let expected = self
            .unit_price
            .checked_mul(self.quantity)
            .ok_or(OrderError::AmountOverflow)?;
        if expected != self.subtotal {
            return Err(OrderError::TotalMismatch {
                expected,
                actual: self.subtotal,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_freezes_price_and_subtotal() {
        let mut product = crate::Product::new("SKU-001", "Widget", Money::from_minor(1000), 5);
        let item = OrderItem::snapshot(&product, 2).unwrap();

        product.price = Money::from_minor(9999);

        assert_eq!(item.unit_price, Money::from_minor(1000));
        assert_eq!(item.subtotal, Money::from_minor(2000));
        assert_eq!(item.product_name, "Widget");
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let result = OrderItem::new("SKU-001", "Widget", 0, Money::from_minor(1000));
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_overflow_detected() {
        let result = OrderItem::new("SKU-001", "Widget", 2, Money::from_minor(i64::MAX));
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
    }

    #[test]
    fn test_verify_detects_tampered_subtotal() {
        let item = OrderItem::new("SKU-001", "Widget", 2, Money::from_minor(1000)).unwrap();
        assert!(item.verify().is_ok());

        let stored = OrderItem::from_stored(
            item.product_id().clone(),
            item.product_name().to_string(),
            item.quantity(),
            item.unit_price(),
            Money::from_minor(1),
        );
        assert!(matches!(
            stored.verify(),
            Err(OrderError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_accessors_expose_the_snapshot() {
        let item = OrderItem::new("SKU-002", "Gadget", 3, Money::from_minor(250)).unwrap();
        assert_eq!(item.product_id().as_str(), "SKU-002");
        assert_eq!(item.product_name(), "Gadget");
        assert_eq!(item.quantity(), 3);
        assert_eq!(item.unit_price(), Money::from_minor(250));
        assert_eq!(item.subtotal(), Money::from_minor(750));
    }
}
