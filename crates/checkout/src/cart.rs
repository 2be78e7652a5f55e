//! Cart service.

use common::{Money, ProductId, UserId};
use domain::{Cart, Product};
use serde::Serialize;
use store::{Store, StoreTx};

use crate::error::{CheckoutError, Missing, Result};

/// A cart line priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub in_stock: bool,
}

/// Read model of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub user_id: UserId,
    pub items: Vec<CartLine>,
    pub total: Money,
    pub total_items: u32,
}

/// Service for managing user carts.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, creating an empty one if needed.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        self.require_user(user_id).await?;

        if let Some(cart) = self.store.get_cart(user_id).await? {
            return Ok(cart);
        }
        let mut tx = self.store.begin().await?;
        let cart = tx.lock_cart(user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Adds units of a product, merging into an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        self.require_user(user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut cart = tx.lock_cart(user_id).await?;
        let product = require_product(&mut tx, product_id).await?;

        cart.add_item(&product, quantity)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;

        tracing::debug!(
            line_quantity = cart.item(product_id).map_or(0, |i| i.quantity),
            "cart item added"
        );
        Ok(cart)
    }

    /// Sets a line's quantity; zero or less removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<Cart> {
        self.require_user(user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut cart = tx.lock_cart(user_id).await?;
        if cart.item(product_id).is_none() {
            return Err(CheckoutError::NotFound(Missing::CartLine(
                product_id.clone(),
            )));
        }

        let product = require_product(&mut tx, product_id).await?;
        cart.update_quantity(&product, quantity)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Removes a line. Removing an absent line is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, product_id: &ProductId) -> Result<Cart> {
        self.require_user(user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut cart = tx.lock_cart(user_id).await?;
        if cart.remove(product_id) {
            tx.save_cart(&cart).await?;
        }
        tx.commit().await?;
        Ok(cart)
    }

    /// Removes every line.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart> {
        self.require_user(user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut cart = tx.lock_cart(user_id).await?;
        if !cart.is_empty() {
            cart.clear();
            tx.save_cart(&cart).await?;
        }
        tx.commit().await?;
        Ok(cart)
    }

    /// Prices the cart at current catalog prices.
    #[tracing::instrument(skip(self))]
    pub async fn view(&self, user_id: UserId) -> Result<CartView> {
        let cart = self.get_or_create(user_id).await?;

        let mut items = Vec::with_capacity(cart.items().len());
        let mut total = Money::zero();
        for line in cart.items() {
            let product = self.require_product(&line.product_id).await?;
            let subtotal = product
                .price
                .checked_mul(line.quantity)
                .ok_or(CheckoutError::InvalidQuantity(i64::from(line.quantity)))?;
            total += subtotal;
            items.push(CartLine {
                in_stock: product.can_supply(line.quantity),
                product_id: product.id,
                product_name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
                subtotal,
            });
        }

        Ok(CartView {
            user_id,
            total_items: cart.total_quantity(),
            items,
            total,
        })
    }

    async fn require_user(&self, user_id: UserId) -> Result<()> {
        match self.store.get_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(CheckoutError::NotFound(Missing::User(user_id))),
        }
    }

    async fn require_product(&self, product_id: &ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(Missing::Product(product_id.clone())))
    }
}

async fn require_product<T: StoreTx>(tx: &mut T, product_id: &ProductId) -> Result<Product> {
    tx.get_product(product_id)
        .await?
        .ok_or_else(|| CheckoutError::NotFound(Missing::Product(product_id.clone())))
}
