//! In-process sandbox gateway.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{Money, OrderNumber};

use super::gateway::{
    GatewayError, GatewayMode, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
    SessionRequest,
};

/// Prefix of every session id the sandbox issues.
pub const SANDBOX_SESSION_PREFIX: &str = "sandbox_session_";

#[derive(Debug, Default)]
struct SandboxState {
    sessions: HashMap<OrderNumber, (String, Money)>,
    payments: HashMap<(OrderNumber, String), GatewayPayment>,
    next_id: u32,
    fail_on_create: bool,
    unavailable: bool,
}

/// Gateway that never leaves the process.
///
/// Payments against a known session are approved for the session amount
/// unless a different outcome was scripted with [`SandboxGateway::script_payment`].
#[derive(Debug, Clone, Default)]
pub struct SandboxGateway {
    state: Arc<RwLock<SandboxState>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes session creation fail until reset.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Makes payment lookups time out until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Fixes what a later lookup of `payment_id` for `order_number` reports.
    pub fn script_payment(
        &self,
        order_number: &OrderNumber,
        payment_id: impl Into<String>,
        status: GatewayPaymentStatus,
        amount: Money,
    ) {
        let payment_id = payment_id.into();
        self.write().payments.insert(
            (order_number.clone(), payment_id.clone()),
            GatewayPayment {
                payment_id,
                order_number: order_number.clone(),
                status,
                amount,
            },
        );
    }

    /// Number of sessions issued so far.
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SandboxState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SandboxState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Sandbox
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        let mut state = self.write();
        if state.fail_on_create {
            return Err(GatewayError::Unavailable(
                "sandbox configured to fail".to_string(),
            ));
        }

        state.next_id += 1;
        let session_id = format!("{SANDBOX_SESSION_PREFIX}{:06}", state.next_id);
        state.sessions.insert(
            request.order_number.clone(),
            (session_id.clone(), request.amount),
        );
        Ok(session_id)
    }

    async fn get_payment(
        &self,
        order_number: &OrderNumber,
        payment_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        let state = self.read();
        if state.unavailable {
            return Err(GatewayError::Timeout);
        }

        if let Some(payment) = state
            .payments
            .get(&(order_number.clone(), payment_id.to_string()))
        {
            return Ok(payment.clone());
        }

        match state.sessions.get(order_number) {
            Some((_, amount)) => Ok(GatewayPayment {
                payment_id: payment_id.to_string(),
                order_number: order_number.clone(),
                status: GatewayPaymentStatus::Success,
                amount: *amount,
            }),
            None => Err(GatewayError::PaymentNotFound(payment_id.to_string())),
        }
    }
}
