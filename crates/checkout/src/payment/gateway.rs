//! Payment gateway trait and the types exchanged with it.

use async_trait::async_trait;
use common::{Money, OrderNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which gateway implementation issued a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// The real payment provider.
    Live,
    /// The in-process sandbox; no money moves.
    Sandbox,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Live => "live",
            GatewayMode::Sandbox => "sandbox",
        }
    }
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "production" => Ok(GatewayMode::Live),
            "sandbox" | "test" => Ok(GatewayMode::Sandbox),
            other => Err(format!("unknown payment gateway mode: {other}")),
        }
    }
}

/// Errors reported by a gateway implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or answered with a server error.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway did not answer within the configured timeout.
    #[error("Payment gateway timed out")]
    Timeout,

    /// The gateway refused the request.
    #[error("Payment gateway rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The gateway has no such payment for the order.
    #[error("Payment {0} not found at the gateway")]
    PaymentNotFound(String),

    /// The gateway answered with something we could not interpret.
    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

/// Customer details forwarded to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Everything the gateway needs to open a payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub order_number: OrderNumber,
    pub amount: Money,
    pub currency: String,
    pub customer: Customer,
    pub return_url: Option<String>,
    pub notify_url: Option<String>,
}

/// Gateway-side state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    /// Money was collected.
    Success,
    /// The payment ended without collecting money.
    Failed,
    /// Not finished yet.
    Pending,
}

impl GatewayPaymentStatus {
    /// Maps a provider status string. Unknown values count as not finished.
    pub fn from_gateway(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => GatewayPaymentStatus::Success,
            "FAILED" | "USER_DROPPED" | "CANCELLED" | "VOID" => GatewayPaymentStatus::Failed,
            _ => GatewayPaymentStatus::Pending,
        }
    }
}

/// A payment as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayment {
    pub payment_id: String,
    pub order_number: OrderNumber,
    pub status: GatewayPaymentStatus,
    pub amount: Money,
}

/// Gateway payment ids arrive as either JSON strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum GatewayId {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayId::Text(s) => write!(f, "{s}"),
            GatewayId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A payment provider.
///
/// One implementation is chosen at startup; nothing switches it at runtime.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which kind of gateway this is.
    fn mode(&self) -> GatewayMode;

    /// Opens a payment session and returns its id.
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError>;

    /// Looks up a payment made against an order.
    async fn get_payment(
        &self,
        order_number: &OrderNumber,
        payment_id: &str,
    ) -> Result<GatewayPayment, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_map_to_outcomes() {
        assert_eq!(
            GatewayPaymentStatus::from_gateway("SUCCESS"),
            GatewayPaymentStatus::Success
        );
        for failed in ["FAILED", "USER_DROPPED", "CANCELLED", "void"] {
            assert_eq!(
                GatewayPaymentStatus::from_gateway(failed),
                GatewayPaymentStatus::Failed
            );
        }
        for pending in ["PENDING", "NOT_ATTEMPTED", "FLAGGED", ""] {
            assert_eq!(
                GatewayPaymentStatus::from_gateway(pending),
                GatewayPaymentStatus::Pending
            );
        }
    }

    #[test]
    fn mode_parses_from_config_values() {
        assert_eq!("live".parse::<GatewayMode>(), Ok(GatewayMode::Live));
        assert_eq!(" Sandbox ".parse::<GatewayMode>(), Ok(GatewayMode::Sandbox));
        assert!("paypal".parse::<GatewayMode>().is_err());
    }

    #[test]
    fn gateway_ids_accept_strings_and_numbers() {
        let text: GatewayId = serde_json::from_str("\"cf_42\"").unwrap();
        let number: GatewayId = serde_json::from_str("42").unwrap();
        assert_eq!(text.to_string(), "cf_42");
        assert_eq!(number.to_string(), "42");
    }
}
