//! Order aggregate and related types.

mod aggregate;
mod item;
pub mod lifecycle;
mod status;

pub use aggregate::{NewOrder, Order, OrderRecord};
pub use item::OrderItem;
pub use lifecycle::{Lifecycle, LifecycleEvent, Step};
pub use status::{OrderStatus, ParseStatusError, PaymentStatus};

use common::{Money, ProductId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The lifecycle does not allow this event in the current state.
    #[error(
        "Invalid state transition: cannot {event} an order in {status} state (payment {payment_status})"
    )]
    InvalidTransition {
        status: OrderStatus,
        payment_status: PaymentStatus,
        event: LifecycleEvent,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// A line subtotal or the order total does not fit in the money type.
    #[error("Order amount overflow")]
    AmountOverflow,

    /// A stored line subtotal or order total does not reconcile with its parts.
    #[error("Order total mismatch: expected {expected}, found {actual}")]
    TotalMismatch { expected: Money, actual: Money },
}
