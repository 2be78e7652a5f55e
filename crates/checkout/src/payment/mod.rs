//! Payment gateway adapter.
//!
//! A single [`PaymentGateway`] implementation is chosen at startup: the live
//! [`CashfreeGateway`] or the in-process [`SandboxGateway`]. Every session
//! carries the [`GatewayMode`] that issued it.

pub mod cashfree;
pub mod gateway;
pub mod sandbox;
pub mod service;
pub mod webhook;

pub use cashfree::{CashfreeConfig, CashfreeGateway};
pub use gateway::{
    Customer, GatewayError, GatewayMode, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
    SessionRequest,
};
pub use sandbox::{SANDBOX_SESSION_PREFIX, SandboxGateway};
pub use service::{
    OrderRef, PaymentService, PaymentSession, PaymentSettings, PaymentVerification,
    VerificationOutcome,
};
pub use webhook::{
    SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookAck, WebhookEvent, WebhookKind, WebhookVerifier,
};
