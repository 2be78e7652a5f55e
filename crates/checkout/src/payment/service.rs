//! Payment sessions, verification and webhook reconciliation.

use std::sync::Arc;

use common::{Money, OrderId, OrderNumber};
use domain::{LifecycleEvent, Order, OrderStatus, PaymentStatus};
use serde::Serialize;
use store::{Store, StoreTx};
use uuid::Uuid;

use super::gateway::{
    Customer, GatewayError, GatewayMode, GatewayPaymentStatus, PaymentGateway, SessionRequest,
};
use super::webhook::{WebhookAck, WebhookEvent, WebhookKind, WebhookVerifier};
use crate::error::{CheckoutError, Missing, Result};
use crate::order::{MAX_ATTEMPTS, OrderService};

/// Settings shared by every session this service opens.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub return_url: Option<String>,
    pub notify_url: Option<String>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            return_url: None,
            notify_url: None,
        }
    }
}

/// An opened payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSession {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub session_id: String,
    pub amount: Money,
    pub currency: String,
    pub mode: GatewayMode,
}

/// How an order is referenced by callers returning from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(OrderId),
    Number(OrderNumber),
}

impl OrderRef {
    /// A UUID is read as an order id; anything else as an order number.
    pub fn parse(value: &str) -> Self {
        match Uuid::parse_str(value.trim()) {
            Ok(uuid) => OrderRef::Id(OrderId::from_uuid(uuid)),
            Err(_) => OrderRef::Number(OrderNumber::new(value.trim())),
        }
    }
}

/// Result of asking the gateway about a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Paid in full for this order.
    Verified,
    /// Definitely not paid.
    Declined,
    /// Not finished at the gateway yet.
    Pending,
    /// The gateway could not be asked.
    Unavailable,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified => "verified",
            VerificationOutcome::Declined => "declined",
            VerificationOutcome::Pending => "pending",
            VerificationOutcome::Unavailable => "unavailable",
        }
    }

    /// Whether the caller should ask again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::Pending | VerificationOutcome::Unavailable
        )
    }
}

/// Verification result with the order as it stands afterwards.
#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub outcome: VerificationOutcome,
    pub verified: bool,
    pub order: Order,
    pub detail: Option<String>,
}

impl PaymentVerification {
    /// Turns anything but a verified payment into an error.
    pub fn ensure_verified(self) -> Result<Order> {
        let detail = self.detail.unwrap_or_default();
        match self.outcome {
            VerificationOutcome::Verified => Ok(self.order),
            VerificationOutcome::Declined => Err(CheckoutError::PaymentVerificationFailed {
                order_number: self.order.order_number().clone(),
                reason: detail,
            }),
            VerificationOutcome::Pending => Err(CheckoutError::GatewayUnavailable(
                GatewayError::Unavailable("payment is still pending".to_string()),
            )),
            VerificationOutcome::Unavailable => {
                Err(CheckoutError::GatewayUnavailable(GatewayError::Unavailable(detail)))
            }
        }
    }
}

/// Reconciles gateway payments with orders.
#[derive(Clone)]
pub struct PaymentService<S: Store> {
    orders: OrderService<S>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    settings: PaymentSettings,
}

impl<S: Store> PaymentService<S> {
    pub fn new(
        orders: OrderService<S>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        settings: PaymentSettings,
    ) -> Self {
        tracing::info!(mode = %gateway.mode(), "payment gateway selected");
        Self {
            orders,
            gateway,
            verifier,
            settings,
        }
    }

    /// Which gateway this service talks to.
    pub fn mode(&self) -> GatewayMode {
        self.gateway.mode()
    }

    /// Opens a gateway session for an unpaid order and records its id.
    ///
    /// Gateway failures surface as `GatewayUnavailable`; no fake session is
    /// ever issued in their place.
    #[tracing::instrument(skip(self))]
    pub async fn create_session(&self, order_id: OrderId) -> Result<PaymentSession> {
        let order = self.orders.get_order(order_id).await?;
        if order.payment_status() == PaymentStatus::Completed
            || order.status() == OrderStatus::Cancelled
        {
            return Err(CheckoutError::InvalidTransition {
                status: order.status(),
                payment_status: order.payment_status(),
                event: LifecycleEvent::PaymentCompleted,
            });
        }

        let user = self
            .orders
            .store()
            .get_user(order.user_id())
            .await?
            .ok_or(CheckoutError::NotFound(Missing::User(order.user_id())))?;

        let request = SessionRequest {
            order_number: order.order_number().clone(),
            amount: order.total_amount(),
            currency: self.settings.currency.clone(),
            customer: Customer {
                id: user.id.to_string(),
                name: user.full_name(),
                email: user.email.clone(),
                phone: user.phone.clone(),
            },
            return_url: self.settings.return_url.clone(),
            notify_url: self.settings.notify_url.clone(),
        };

        let session_id = self.gateway.create_session(&request).await.map_err(|e| {
            tracing::warn!(
                order_number = %order.order_number(),
                error = %e,
                "payment session creation failed"
            );
            CheckoutError::GatewayUnavailable(e)
        })?;

        let order = self.orders.attach_session(order_id, &session_id).await?;

        let mode = self.gateway.mode();
        metrics::counter!("payment_sessions_created_total", "mode" => mode.as_str()).increment(1);
        tracing::info!(
            order_number = %order.order_number(),
            %mode,
            "payment session opened"
        );

        Ok(PaymentSession {
            order_id,
            order_number: order.order_number().clone(),
            session_id,
            amount: order.total_amount(),
            currency: self.settings.currency.clone(),
            mode,
        })
    }

    /// Asks the gateway about a payment and records the answer.
    ///
    /// Only a definitive answer changes the order: success completes the
    /// payment, failure (or a payment for another order or amount) fails it.
    /// Pending payments and gateway errors leave the order untouched.
    #[tracing::instrument(skip(self, order_ref), fields(payment_id = %payment_id))]
    pub async fn verify_payment(
        &self,
        order_ref: &OrderRef,
        payment_id: &str,
    ) -> Result<PaymentVerification> {
        let order = match order_ref {
            OrderRef::Id(id) => self.orders.get_order(*id).await?,
            OrderRef::Number(number) => self.orders.get_order_by_number(number).await?,
        };

        if order.payment_status() == PaymentStatus::Completed {
            tracing::debug!(order_number = %order.order_number(), "payment already completed");
            return Ok(self.record(VerificationOutcome::Verified, order, None));
        }

        let (outcome, detail) = match self
            .gateway
            .get_payment(order.order_number(), payment_id)
            .await
        {
            Ok(payment) if payment.order_number != *order.order_number() => (
                VerificationOutcome::Declined,
                Some(format!(
                    "payment belongs to order {}",
                    payment.order_number
                )),
            ),
            Ok(payment) => match payment.status {
                GatewayPaymentStatus::Success if payment.amount != order.total_amount() => (
                    VerificationOutcome::Declined,
                    Some(format!(
                        "paid {} but order total is {}",
                        payment.amount,
                        order.total_amount()
                    )),
                ),
                GatewayPaymentStatus::Success => (VerificationOutcome::Verified, None),
                GatewayPaymentStatus::Failed => (
                    VerificationOutcome::Declined,
                    Some("payment failed at the gateway".to_string()),
                ),
                GatewayPaymentStatus::Pending => (VerificationOutcome::Pending, None),
            },
            Err(GatewayError::PaymentNotFound(id)) => (
                VerificationOutcome::Declined,
                Some(format!("payment {id} not found")),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "payment verification deferred");
                (VerificationOutcome::Unavailable, Some(e.to_string()))
            }
        };

        let order = match outcome {
            VerificationOutcome::Verified => {
                self.orders
                    .apply_payment_result(order.id(), true, Some(payment_id))
                    .await?
                    .order
            }
            VerificationOutcome::Declined => {
                self.orders
                    .apply_payment_result(order.id(), false, None)
                    .await?
                    .order
            }
            VerificationOutcome::Pending | VerificationOutcome::Unavailable => order,
        };

        Ok(self.record(outcome, order, detail))
    }

    fn record(
        &self,
        outcome: VerificationOutcome,
        order: Order,
        detail: Option<String>,
    ) -> PaymentVerification {
        metrics::counter!("payment_verifications_total", "outcome" => outcome.as_str())
            .increment(1);
        tracing::info!(
            order_number = %order.order_number(),
            outcome = outcome.as_str(),
            payment_status = %order.payment_status(),
            "payment verification recorded"
        );
        PaymentVerification {
            outcome,
            verified: outcome == VerificationOutcome::Verified,
            order,
            detail,
        }
    }

    /// Handles a gateway notification.
    ///
    /// The signature is checked before the body is parsed. The event key and
    /// the order change commit together, so a redelivered event is
    /// acknowledged as a duplicate without touching the order.
    #[tracing::instrument(skip_all)]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<WebhookAck> {
        let result = self.process_webhook(body, signature, timestamp).await;
        let outcome = match &result {
            Ok(ack) => ack.as_str(),
            Err(CheckoutError::InvalidWebhookSignature) => "rejected",
            Err(_) => "error",
        };
        metrics::counter!("webhooks_received_total", "outcome" => outcome).increment(1);
        result
    }

    async fn process_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<WebhookAck> {
        if let Err(e) = self.verifier.verify(body, signature, timestamp) {
            tracing::warn!("webhook signature rejected");
            return Err(e);
        }

        let event = WebhookEvent::parse(body)?;
        let event_type = match &event.kind {
            WebhookKind::PaymentSucceeded => LifecycleEvent::PaymentCompleted,
            WebhookKind::PaymentFailed => LifecycleEvent::PaymentFailed,
            WebhookKind::Other(kind) => {
                tracing::debug!(kind = %kind, "webhook type ignored");
                return Ok(WebhookAck::Ignored);
            }
        };
        let Some(order_number) = event.order_number.as_ref() else {
            return Ok(WebhookAck::Ignored);
        };

        let store = self.orders.store();
        let Some(order) = store.get_order_by_number(order_number).await? else {
            tracing::warn!(order_number = %order_number, "webhook for unknown order");
            return Ok(WebhookAck::Ignored);
        };

        let mut attempt = 1;
        loop {
            let mut tx = store.begin().await?;
            if !tx.mark_event_processed(&event.event_key).await? {
                tracing::info!(event_key = %event.event_key, "duplicate webhook");
                return Ok(WebhookAck::Duplicate);
            }

            match self
                .orders
                .apply_in(&mut tx, order.id(), event_type, event.payment_id.as_deref())
                .await
            {
                Ok(transition) => {
                    tx.commit().await?;
                    tracing::info!(
                        order_number = %order_number,
                        event_key = %event.event_key,
                        advanced = transition.is_advanced(),
                        "webhook applied"
                    );
                    return Ok(WebhookAck::Accepted);
                }
                Err(CheckoutError::ConcurrencyConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
