use common::UserId;
use domain::{Order, OrderStatus, PaymentStatus};

/// Filter and page for order listings.
///
/// Empty fields match everything, so the default filter lists every order.
/// Results are ordered newest first before `offset` and `limit` apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only orders placed by this user.
    pub user_id: Option<UserId>,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,

    /// Only orders with this payment status.
    pub payment_status: Option<PaymentStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of matching orders to skip.
    pub offset: Option<usize>,
}

impl OrderFilter {
    /// Creates a filter that matches every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Restricts the filter to a user.
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Restricts the filter to a status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts the filter to a payment status.
    pub fn with_payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    /// Limits the number of orders returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching orders.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Applies `offset` and `limit` to orders that already match.
    pub fn page<T>(&self, matching: impl Iterator<Item = T>) -> Vec<T> {
        matching
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Returns true if the order passes every set criterion.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id() != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status() != status
        {
            return false;
        }
        if let Some(payment_status) = self.payment_status
            && order.payment_status() != payment_status
        {
            return false;
        }
        true
    }
}
