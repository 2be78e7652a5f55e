//! Checkout workflows.
//!
//! This crate provides:
//! - Cart management priced against the live catalog
//! - The inventory ledger, the only component that moves stock
//! - Order creation as a single reserve, insert and clear-cart transaction
//! - Lifecycle operations with optimistic-concurrency retries
//! - Payment sessions, verification and signed webhook reconciliation

pub mod cart;
pub mod error;
pub mod inventory;
pub mod order;
pub mod payment;

pub use cart::{CartLine, CartService, CartView};
pub use error::{CheckoutError, Missing, Result};
pub use inventory::InventoryLedger;
pub use order::{OrderService, PlaceOrder, Transition};
pub use payment::{
    CashfreeConfig, CashfreeGateway, GatewayError, GatewayMode, OrderRef, PaymentGateway,
    PaymentService, PaymentSession, PaymentSettings, PaymentVerification, SandboxGateway,
    VerificationOutcome, WebhookAck, WebhookVerifier,
};
