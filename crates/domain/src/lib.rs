//! Domain layer for the checkout system.
//!
//! This crate provides the core domain types including:
//! - Product and User records consumed from the catalog and user collaborators
//! - Cart aggregate with per-product line merging and stock validation
//! - Order aggregate holding a frozen line-item snapshot
//! - Order lifecycle state machine as a pure transition function

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartError, CartItem, Unavailable};
pub use common::{Money, OrderId, OrderNumber, ProductId, UserId, Version};
pub use order::{
    Lifecycle, LifecycleEvent, NewOrder, Order, OrderError, OrderItem, OrderRecord, OrderStatus,
    ParseStatusError, PaymentStatus, Step,
};
pub use product::Product;
pub use user::User;
