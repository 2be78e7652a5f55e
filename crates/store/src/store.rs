use async_trait::async_trait;
use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{Cart, Order, Product, User};

use crate::{OrderFilter, Result};

/// Core trait for store implementations.
///
/// Plain reads see committed state only. Anything that must change several
/// rows together goes through a [`StoreTx`] obtained from [`Store::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync + Clone + 'static {
    /// Transaction type produced by [`Store::begin`].
    type Tx: StoreTx;

    /// Opens a transaction.
    ///
    /// While a transaction is open, the caller must use its methods rather
    /// than the store's own reads.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Retrieves a user record.
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Retrieves a product with its current stock level.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Retrieves a user's cart, if one was ever saved.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves an order by its external order number.
    async fn get_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>>;

    /// Lists orders matching a filter, newest first, one page at a time.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>>;

    /// Inserts or replaces a user record.
    async fn put_user(&self, user: &User) -> Result<()>;

    /// Inserts or replaces a product, including its stock level.
    async fn put_product(&self, product: &Product) -> Result<()>;
}

/// An atomic unit of work.
///
/// Every change made through a transaction becomes visible together on
/// [`StoreTx::commit`]. Dropping the transaction without committing discards
/// all of its changes.
#[async_trait]
pub trait StoreTx: Send + Sized {
    /// Reads a product inside the transaction.
    async fn get_product(&mut self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Reads a user's cart and locks it until the transaction ends.
    ///
    /// A user without a cart gets an empty one, stored and locked the same
    /// way. Checkout and every cart edit go through this lock, so a cart is
    /// never ordered twice and an edit never resurrects ordered lines.
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Cart>;

    /// Replaces the lines of a cart locked by [`StoreTx::lock_cart`].
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Reads an order and locks it until the transaction ends.
    async fn get_order_for_update(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Decrements stock if at least `quantity` units are available.
    ///
    /// Returns the remaining stock. Fails with `InsufficientStock` without
    /// changing anything otherwise.
    async fn reserve_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32>;

    /// Increments stock, returning the new level.
    async fn restore_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32>;

    /// Inserts a newly placed order and its items.
    ///
    /// The order must be at the initial version. Returns the stored version.
    async fn insert_order(&mut self, order: &Order) -> Result<Version>;

    /// Writes an order's mutable fields if the stored version still matches
    /// `order.version()`. Returns the new version.
    async fn update_order(&mut self, order: &Order) -> Result<Version>;

    /// Removes every line from a user's cart.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<()>;

    /// Records a webhook event key. Returns false if it was already recorded.
    async fn mark_event_processed(&mut self, event_key: &str) -> Result<bool>;

    /// Commits the transaction.
    async fn commit(self) -> Result<()>;
}
