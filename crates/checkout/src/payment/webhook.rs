//! Webhook signature checks and payload parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::OrderNumber;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::gateway::GatewayId;
use crate::error::{CheckoutError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

pub const PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS_WEBHOOK";
pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED_WEBHOOK";

/// Checks `base64(HMAC-SHA256(secret, timestamp || body))`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Produces the signature a sender would attach.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String> {
        Ok(BASE64.encode(self.mac(timestamp, body)?.finalize().into_bytes()))
    }

    /// Verifies a delivery in constant time. An empty secret accepts nothing.
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<()> {
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return Err(CheckoutError::InvalidWebhookSignature);
        };
        if self.secret.is_empty() {
            return Err(CheckoutError::InvalidWebhookSignature);
        }

        let expected = BASE64
            .decode(signature.trim())
            .map_err(|_| CheckoutError::InvalidWebhookSignature)?;
        self.mac(timestamp, body)?
            .verify_slice(&expected)
            .map_err(|_| CheckoutError::InvalidWebhookSignature)
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| CheckoutError::InvalidWebhookSignature)?;
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Ok(mac)
    }
}

/// What a webhook reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    PaymentSucceeded,
    PaymentFailed,
    /// Any event type this service does not act on.
    Other(String),
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub order_number: Option<OrderNumber>,
    pub payment_id: Option<String>,
    /// Idempotency key: the sender's event id, or `type:order:payment`.
    pub event_key: String,
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<RawData>,
    #[serde(default)]
    event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    cf_payment_id: Option<GatewayId>,
}

impl WebhookEvent {
    /// Parses a verified body. Payment events must name the order and the
    /// payment; other event types only need a `type`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawWebhook = serde_json::from_slice(body)
            .map_err(|e| CheckoutError::MalformedWebhook(e.to_string()))?;

        let kind = match raw.kind.as_str() {
            PAYMENT_SUCCESS => WebhookKind::PaymentSucceeded,
            PAYMENT_FAILED => WebhookKind::PaymentFailed,
            _ => WebhookKind::Other(raw.kind.clone()),
        };

        let order_number = raw
            .data
            .as_ref()
            .and_then(|d| d.order_id.as_deref())
            .filter(|id| !id.is_empty())
            .map(OrderNumber::new);
        let payment_id = raw
            .data
            .as_ref()
            .and_then(|d| d.cf_payment_id.as_ref())
            .map(ToString::to_string);

        if !matches!(kind, WebhookKind::Other(_)) && (order_number.is_none() || payment_id.is_none())
        {
            return Err(CheckoutError::MalformedWebhook(
                "payment event without data.order_id or data.cf_payment_id".to_string(),
            ));
        }

        let event_key = match raw.event_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => format!(
                "{}:{}:{}",
                raw.kind,
                order_number.as_ref().map_or("", |n| n.as_str()),
                payment_id.as_deref().unwrap_or("")
            ),
        };

        Ok(Self {
            kind,
            order_number,
            payment_id,
            event_key,
        })
    }
}

/// Acknowledgement returned to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAck {
    /// The event was applied.
    Accepted,
    /// The event was seen before; nothing changed.
    Duplicate,
    /// The event was not actionable; nothing changed.
    Ignored,
}

impl WebhookAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAck::Accepted => "accepted",
            WebhookAck::Duplicate => "duplicate",
            WebhookAck::Ignored => "ignored",
        }
    }
}
