//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderNumber, UserId, Version};

use super::{
    Lifecycle, LifecycleEvent, OrderError, OrderItem, OrderStatus, PaymentStatus, Step, lifecycle,
};

/// Input for placing a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub items: Vec<OrderItem>,
    pub shipping_address: String,
    pub billing_address: String,
}

/// Order aggregate root.
///
/// The line items and total are fixed when the order is placed. Status and
/// payment status only change through [`Order::apply`], which delegates to the
/// pure [`lifecycle::next`] function.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    user_id: UserId,
    items: Vec<OrderItem>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total_amount: Money,
    shipping_address: String,
    billing_address: String,
    gateway_session_id: Option<String>,
    gateway_payment_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Version of the stored record this instance was loaded from.
    version: Version,
}

/// Flat representation of an order used by storage backends.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
    pub shipping_address: String,
    pub billing_address: String,
    pub gateway_session_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

// Construction
impl Order {
    /// Places a new order from a line-item snapshot.
    ///
    /// The order starts in `Processing` with a `Pending` payment, and its total
    /// is the sum of the line subtotals.
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let total_amount = sum_subtotals(&new.items)?;
        let placed = Lifecycle::placed();
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            order_number: new.order_number,
            user_id: new.user_id,
            items: new.items,
            status: placed.status,
            payment_status: placed.payment,
            total_amount,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            gateway_session_id: None,
            gateway_payment_id: None,
            created_at: now,
            updated_at: now,
            version: Version::unsaved(),
        })
    }

    /// Rebuilds an order from storage, re-checking the total invariant.
    pub fn from_record(record: OrderRecord) -> Result<Self, OrderError> {
        if record.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &record.items {
            item.verify()?;
        }
        let expected = sum_subtotals(&record.items)?;
        if expected != record.total_amount {
            return Err(OrderError::TotalMismatch {
                expected,
                actual: record.total_amount,
            });
        }

        Ok(Self {
            id: record.id,
            order_number: record.order_number,
            user_id: record.user_id,
            items: record.items,
            status: record.status,
            payment_status: record.payment_status,
            total_amount: record.total_amount,
            shipping_address: record.shipping_address,
            billing_address: record.billing_address,
            gateway_session_id: record.gateway_session_id,
            gateway_payment_id: record.gateway_payment_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
        })
    }

    /// Flattens the order for storage.
    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            order_number: self.order_number.clone(),
            user_id: self.user_id,
            items: self.items.clone(),
            status: self.status,
            payment_status: self.payment_status,
            total_amount: self.total_amount,
            shipping_address: self.shipping_address.clone(),
            billing_address: self.billing_address.clone(),
            gateway_session_id: self.gateway_session_id.clone(),
            gateway_payment_id: self.gateway_payment_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.status, self.payment_status)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &str {
        &self.billing_address
    }

    pub fn gateway_session_id(&self) -> Option<&str> {
        self.gateway_session_id.as_deref()
    }

    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.gateway_payment_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(OrderItem::quantity).sum()
    }
}

// Command methods
impl Order {
    /// Feeds an event to the lifecycle state machine and adopts the result.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Step, OrderError> {
        let step = lifecycle::next(self.lifecycle(), event)?;
        if let Step::Advanced(next) = step {
            self.status = next.status;
            self.payment_status = next.payment;
            self.updated_at = Utc::now();
        }
        Ok(step)
    }

    /// Records the gateway session created for this order.
    pub fn attach_session(&mut self, session_id: impl Into<String>) {
        self.gateway_session_id = Some(session_id.into());
        self.updated_at = Utc::now();
    }

    /// Records the gateway payment id. Returns false if it was already set to
    /// the same value.
    pub fn record_gateway_payment(&mut self, payment_id: impl Into<String>) -> bool {
        let payment_id = payment_id.into();
        if self.gateway_payment_id.as_deref() == Some(payment_id.as_str()) {
            return false;
        }
        self.gateway_payment_id = Some(payment_id);
        self.updated_at = Utc::now();
        true
    }

    /// Sets the stored version after a successful write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

fn sum_subtotals(items: &[OrderItem]) -> Result<Money, OrderError> {
    items.iter().try_fold(Money::zero(), |acc, item| {
        acc.checked_add(item.subtotal())
            .ok_or(OrderError::AmountOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(items: Vec<OrderItem>) -> NewOrder {
        NewOrder {
            user_id: UserId::new(),
            order_number: OrderNumber::generate(),
            items,
            shipping_address: "1 Ship St".to_string(),
            billing_address: "1 Bill St".to_string(),
        }
    }

    fn widget(quantity: u32) -> OrderItem {
        OrderItem::new("SKU-001", "Widget", quantity, Money::from_minor(1000)).unwrap()
    }

    fn gadget(quantity: u32) -> OrderItem {
        OrderItem::new("SKU-002", "Gadget", quantity, Money::from_minor(2550)).unwrap()
    }

    #[test]
    fn test_place_order() {
        let order = Order::place(new_order(vec![widget(2)])).unwrap();

        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_minor(2000));
        assert_eq!(order.version(), Version::unsaved());
        assert!(order.gateway_session_id().is_none());
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let order = Order::place(new_order(vec![widget(2), gadget(3)])).unwrap();

        let sum: Money = order.items().iter().map(OrderItem::subtotal).sum();
        assert_eq!(order.total_amount(), sum);
        assert_eq!(order.total_amount(), Money::from_minor(2000 + 7650));
        assert_eq!(order.total_quantity(), 5);
    }

    #[test]
    fn test_place_without_items_fails() {
        let result = Order::place(new_order(vec![]));
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn test_apply_payment_completed_confirms() {
        let mut order = Order::place(new_order(vec![widget(1)])).unwrap();

        let step = order.apply(LifecycleEvent::PaymentCompleted).unwrap();
        assert!(step.is_advanced());
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.payment_status(), PaymentStatus::Completed);

        let step = order.apply(LifecycleEvent::PaymentCompleted).unwrap();
        assert_eq!(step, Step::Unchanged);
    }

    #[test]
    fn test_failed_transition_leaves_order_untouched() {
        let mut order = Order::place(new_order(vec![widget(1)])).unwrap();
        let before = order.clone();

        assert!(order.apply(LifecycleEvent::Deliver).is_err());
        assert_eq!(order, before);
    }

    #[test]
    fn test_record_round_trip_preserves_order() {
        let mut order = Order::place(new_order(vec![widget(2), gadget(1)])).unwrap();
        order.attach_session("session_123");
        order.set_version(Version::new(4));

        let rebuilt = Order::from_record(order.to_record()).unwrap();
        assert_eq!(rebuilt, order);
    }

    #[test]
    fn test_from_record_rejects_mismatched_total() {
        let order = Order::place(new_order(vec![widget(2)])).unwrap();
        let mut record = order.to_record();
        record.total_amount = Money::from_minor(1);

        assert!(matches!(
            Order::from_record(record),
            Err(OrderError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_record_gateway_payment_is_idempotent() {
        let mut order = Order::place(new_order(vec![widget(1)])).unwrap();
        assert!(order.record_gateway_payment("cf_1"));
        assert!(!order.record_gateway_payment("cf_1"));
        assert_eq!(order.gateway_payment_id(), Some("cf_1"));
    }
}
