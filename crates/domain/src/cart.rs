//! Cart aggregate.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::product::Product;

/// Why a product cannot be put in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The product has been deactivated in the catalog.
    Inactive,
    /// The requested line quantity exceeds the last known stock level.
    ExceedsStock { requested: u32, in_stock: u32 },
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Inactive => write!(f, "product is not active"),
            Unavailable::ExceedsStock {
                requested,
                in_stock,
            } => write!(f, "requested {requested} but only {in_stock} in stock"),
        }
    }
}

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The product is inactive or does not have enough stock.
    #[error("Product {product_id} unavailable: {reason}")]
    ProductUnavailable {
        product_id: ProductId,
        reason: Unavailable,
    },

    /// Quantity must be greater than zero (or fit in a line quantity).
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// The cart has no line for this product.
    #[error("Cart item not found: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// A stored cart contained two lines for the same product.
    #[error("Duplicate cart line for product {product_id}")]
    DuplicateLine { product_id: ProductId },
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A user's pending checkout.
///
/// Lines keep their insertion order, which becomes the order of the
/// line items when the cart is converted into an order. There is at most one
/// line per product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a cart from stored lines, rejecting duplicate or empty lines.
    pub fn from_items(
        user_id: UserId,
        items: Vec<CartItem>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CartError> {
        for (i, item) in items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(CartError::InvalidQuantity { quantity: 0 });
            }
            if items[..i].iter().any(|prev| prev.product_id == item.product_id) {
                return Err(CartError::DuplicateLine {
                    product_id: item.product_id.clone(),
                });
            }
        }

        Ok(Self {
            user_id,
            items,
            updated_at,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the line for a product, if any.
    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    /// Returns the sum of all line quantities.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Adds `quantity` units of a product.
    ///
    /// Merges into the existing line when there is one. The merged line
    /// quantity is checked against the product's last known stock; this check
    /// is advisory, stock is only enforced when an order reserves it.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }

        let existing = self.item(&product.id).map_or(0, |i| i.quantity);
        let requested = existing
            .checked_add(quantity)
            .ok_or(CartError::InvalidQuantity {
                quantity: i64::from(existing) + i64::from(quantity),
            })?;
        check_supply(product, requested)?;

        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(line) => line.quantity = requested,
            None => self.items.push(CartItem {
                product_id: product.id.clone(),
                quantity: requested,
            }),
        }
        self.touch();
        Ok(())
    }

    /// Sets the quantity of an existing line. A quantity of zero or less
    /// removes the line.
    pub fn update_quantity(&mut self, product: &Product, quantity: i64) -> Result<(), CartError> {
        let position = self
            .items
            .iter()
            .position(|i| i.product_id == product.id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product.id.clone(),
            })?;

        if quantity <= 0 {
            self.items.remove(position);
            self.touch();
            return Ok(());
        }

        let quantity = u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { quantity })?;
        check_supply(product, quantity)?;

        self.items[position].quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removes the line for a product. Returns false if there was none.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn check_supply(product: &Product, requested: u32) -> Result<(), CartError> {
    if !product.active {
        return Err(CartError::ProductUnavailable {
            product_id: product.id.clone(),
            reason: Unavailable::Inactive,
        });
    }
    if !product.can_supply(requested) {
        return Err(CartError::ProductUnavailable {
            product_id: product.id.clone(),
            reason: Unavailable::ExceedsStock {
                requested,
                in_stock: product.stock_quantity,
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", "Widget", Money::from_minor(1000), stock)
    }

    fn gadget(stock: u32) -> Product {
        Product::new("SKU-002", "Gadget", Money::from_minor(2500), stock)
    }

    #[test]
    fn test_add_item_creates_line() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(&widget(5), 2).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item(&"SKU-001".into()).unwrap().quantity, 2);
    }

    #[test]
    fn test_add_item_merges_existing_line() {
        let mut cart = Cart::new(UserId::new());
        let product = widget(5);
        cart.add_item(&product, 2).unwrap();
        cart.add_item(&product, 3).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_add_item_keeps_insertion_order() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(&gadget(5), 1).unwrap();
        cart.add_item(&widget(5), 1).unwrap();
        cart.add_item(&gadget(5), 1).unwrap();

        let ids: Vec<_> = cart.items().iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["SKU-002", "SKU-001"]);
    }

    #[test]
    fn test_add_item_rejects_inactive_product() {
        let mut cart = Cart::new(UserId::new());
        let result = cart.add_item(&widget(5).deactivated(), 1);

        assert!(matches!(
            result,
            Err(CartError::ProductUnavailable {
                reason: Unavailable::Inactive,
                ..
            })
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_item_rejects_merged_quantity_over_stock() {
        let mut cart = Cart::new(UserId::new());
        let product = widget(5);
        cart.add_item(&product, 4).unwrap();

        let result = cart.add_item(&product, 2);
        assert!(matches!(
            result,
            Err(CartError::ProductUnavailable {
                reason: Unavailable::ExceedsStock {
                    requested: 6,
                    in_stock: 5
                },
                ..
            })
        ));
        assert_eq!(cart.total_quantity(), 4);
    }

    #[test]
    fn test_add_zero_quantity_rejected() {
        let mut cart = Cart::new(UserId::new());
        assert!(matches!(
            cart.add_item(&widget(5), 0),
            Err(CartError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn test_update_quantity_sets_value() {
        let mut cart = Cart::new(UserId::new());
        let product = widget(10);
        cart.add_item(&product, 2).unwrap();
        cart.update_quantity(&product, 7).unwrap();

        assert_eq!(cart.total_quantity(), 7);
    }

    #[test]
    fn test_update_quantity_zero_or_negative_removes_line() {
        let mut cart = Cart::new(UserId::new());
        let product = widget(10);
        cart.add_item(&product, 2).unwrap();
        cart.update_quantity(&product, 0).unwrap();
        assert!(cart.is_empty());

        cart.add_item(&product, 2).unwrap();
        cart.update_quantity(&product, -3).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_validates_stock() {
        let mut cart = Cart::new(UserId::new());
        let product = widget(3);
        cart.add_item(&product, 1).unwrap();

        assert!(matches!(
            cart.update_quantity(&product, 4),
            Err(CartError::ProductUnavailable { .. })
        ));
        assert_eq!(cart.total_quantity(), 1);
    }

    #[test]
    fn test_update_quantity_of_missing_line_fails() {
        let mut cart = Cart::new(UserId::new());
        assert!(matches!(
            cart.update_quantity(&widget(3), 1),
            Err(CartError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(&widget(5), 1).unwrap();
        cart.add_item(&gadget(5), 1).unwrap();

        assert!(cart.remove(&"SKU-001".into()));
        assert!(!cart.remove(&"SKU-001".into()));
        assert_eq!(cart.items().len(), 1);

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_from_items_rejects_duplicate_lines() {
        let items = vec![
            CartItem {
                product_id: "SKU-001".into(),
                quantity: 1,
            },
            CartItem {
                product_id: "SKU-001".into(),
                quantity: 2,
            },
        ];

        let result = Cart::from_items(UserId::new(), items, Utc::now());
        assert!(matches!(result, Err(CartError::DuplicateLine { .. })));
    }
}
