//! Checkout error types.

use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{CartError, LifecycleEvent, OrderError, OrderStatus, PaymentStatus, Unavailable};
use store::StoreError;
use thiserror::Error;

use crate::payment::GatewayError;

/// What a `NotFound` error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    User(UserId),
    Product(ProductId),
    Order(OrderId),
    OrderNumber(OrderNumber),
    CartLine(ProductId),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::User(id) => write!(f, "user {id}"),
            Missing::Product(id) => write!(f, "product {id}"),
            Missing::Order(id) => write!(f, "order {id}"),
            Missing::OrderNumber(number) => write!(f, "order {number}"),
            Missing::CartLine(id) => write!(f, "cart line for product {id}"),
        }
    }
}

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A referenced user, product, order or cart line does not exist.
    #[error("Not found: {0}")]
    NotFound(Missing),

    /// A reservation asked for more units than are in stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout was attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The product cannot be added or ordered.
    #[error("Product {product_id} is unavailable: {reason}")]
    ProductUnavailable {
        product_id: ProductId,
        reason: Unavailable,
    },

    /// The order lifecycle does not allow the requested change.
    #[error("Cannot {event} an order in {status} state (payment {payment_status})")]
    InvalidTransition {
        status: OrderStatus,
        payment_status: PaymentStatus,
        event: LifecycleEvent,
    },

    /// The gateway did not confirm the payment.
    #[error("Payment verification failed for order {order_number}: {reason}")]
    PaymentVerificationFailed {
        order_number: OrderNumber,
        reason: String,
    },

    /// The payment gateway could not be reached or answered with an error.
    /// Retrying later may succeed.
    #[error("{0}")]
    GatewayUnavailable(#[from] GatewayError),

    /// A webhook carried a missing or wrong signature.
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    /// A signed webhook body could not be understood.
    #[error("Malformed webhook payload: {0}")]
    MalformedWebhook(String),

    /// The order kept changing underneath the operation.
    #[error("Order {order_id} was modified concurrently (expected {expected}, found {actual})")]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// A quantity was zero, negative or too large.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// A stored record violates an order invariant.
    #[error("Order invariant violated: {0}")]
    Order(OrderError),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual,
            } => CheckoutError::ConcurrencyConflict {
                order_id,
                expected,
                actual,
            },
            StoreError::ProductNotFound(product_id) => {
                CheckoutError::NotFound(Missing::Product(product_id))
            }
            StoreError::OrderNotFound(order_id) => CheckoutError::NotFound(Missing::Order(order_id)),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition {
                status,
                payment_status,
                event,
            } => CheckoutError::InvalidTransition {
                status,
                payment_status,
                event,
            },
            OrderError::InvalidQuantity { quantity, .. } => {
                CheckoutError::InvalidQuantity(i64::from(quantity))
            }
            other => CheckoutError::Order(other),
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ProductUnavailable { product_id, reason } => {
                CheckoutError::ProductUnavailable { product_id, reason }
            }
            CartError::InvalidQuantity { quantity } => CheckoutError::InvalidQuantity(quantity),
            CartError::ItemNotFound { product_id } => {
                CheckoutError::NotFound(Missing::CartLine(product_id))
            }
            CartError::DuplicateLine { product_id } => CheckoutError::Store(StoreError::Corrupt(
                format!("duplicate cart line for product {product_id}"),
            )),
        }
    }
}

impl CheckoutError {
    /// Returns true if the same request may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::GatewayUnavailable(_) | CheckoutError::ConcurrencyConflict { .. }
        )
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
