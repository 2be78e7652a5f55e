use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{Cart, Order, Product, User};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::{
    OrderFilter, Result, StoreError,
    store::{Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashMap<OrderNumber, OrderId>,
    processed_events: HashMap<String, DateTime<Utc>>,
}

fn newest_first<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
    let mut orders: Vec<Order> = orders.cloned().collect();
    orders.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.order_number().as_str().cmp(b.order_number().as_str()))
    });
    orders
}

/// In-memory store implementation for tests and local runs.
///
/// A transaction holds the write lock for its whole lifetime and works on a
/// staged copy of the state, so transactions are serialized and a dropped
/// transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedRwLockWriteGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.state.clone().write_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTx { guard, staged })
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&user_id).cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .order_numbers
            .get(order_number)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let matching = newest_first(state.orders.values().filter(|o| filter.matches(o)));
        Ok(filter.page(matching.into_iter()))
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        self.state
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        Ok(())
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.staged.products.get(product_id).cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .staged
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id))
            .clone())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.staged.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }

    async fn get_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn reserve_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let product = self
            .staged
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        let remaining = product.stock_quantity.checked_sub(quantity).ok_or_else(|| {
            StoreError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: product.stock_quantity,
            }
        })?;
        product.stock_quantity = remaining;
        Ok(remaining)
    }

    async fn restore_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let product = self
            .staged
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        let restored = product
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| StoreError::StockOverflow(product_id.clone()))?;
        product.stock_quantity = restored;
        Ok(restored)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Version> {
        if order.version() != Version::unsaved() || self.staged.orders.contains_key(&order.id()) {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: Version::unsaved(),
                actual: order.version(),
            });
        }
        if self.staged.order_numbers.contains_key(order.order_number()) {
            return Err(StoreError::DuplicateOrderNumber(
                order.order_number().clone(),
            ));
        }

        let version = Version::inserted();
        let mut stored = order.clone();
        stored.set_version(version);
        self.staged
            .order_numbers
            .insert(order.order_number().clone(), order.id());
        self.staged.orders.insert(order.id(), stored);
        Ok(version)
    }

    async fn update_order(&mut self, order: &Order) -> Result<Version> {
        let stored = self
            .staged
            .orders
            .get_mut(&order.id())
            .ok_or(StoreError::OrderNotFound(order.id()))?;

        if stored.version() != order.version() {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: order.version(),
                actual: stored.version(),
            });
        }

        let version = order.version().next();
        let mut updated = order.clone();
        updated.set_version(version);
        *stored = updated;
        Ok(version)
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        if let Some(cart) = self.staged.carts.get_mut(&user_id) {
            cart.clear();
        }
        Ok(())
    }

    async fn mark_event_processed(&mut self, event_key: &str) -> Result<bool> {
        if self.staged.processed_events.contains_key(event_key) {
            return Ok(false);
        }
        self.staged
            .processed_events
            .insert(event_key.to_string(), Utc::now());
        Ok(true)
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
