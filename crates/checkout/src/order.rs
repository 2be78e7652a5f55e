//! Order creation workflow and order lifecycle operations.

use std::time::Instant;

use common::{OrderId, OrderNumber, UserId};
use domain::{LifecycleEvent, NewOrder, Order, OrderItem, Step, Unavailable};
use store::{OrderFilter, Store, StoreTx};

use crate::error::{CheckoutError, Missing, Result};
use crate::inventory::InventoryLedger;

/// How many times a lifecycle change is attempted when the order keeps
/// changing underneath it.
pub const MAX_ATTEMPTS: u32 = 3;

/// Checkout request for a user's current cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub shipping_address: String,
    /// Defaults to the shipping address.
    pub billing_address: Option<String>,
}

impl PlaceOrder {
    pub fn new(shipping_address: impl Into<String>) -> Self {
        Self {
            shipping_address: shipping_address.into(),
            billing_address: None,
        }
    }

    pub fn with_billing_address(mut self, billing_address: impl Into<String>) -> Self {
        self.billing_address = Some(billing_address.into());
        self
    }
}

/// Outcome of a lifecycle operation.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The order after the operation.
    pub order: Order,
    /// Whether the lifecycle state moved.
    pub step: Step,
}

impl Transition {
    pub fn is_advanced(&self) -> bool {
        self.step.is_advanced()
    }
}

/// Service for placing orders and driving them through their lifecycle.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        let ledger = InventoryLedger::new(store.clone());
        Self { store, ledger }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converts the user's cart into an order.
    ///
    /// Snapshotting, stock reservation, the order insert and clearing the
    /// cart happen in one transaction; on any failure nothing is persisted.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(&self, user_id: UserId, request: PlaceOrder) -> Result<Order> {
        let start = Instant::now();

        let result = self.place(user_id, request).await;
        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                metrics::histogram!("order_creation_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_number = %order.order_number(),
                    total = %order.total_amount(),
                    items = order.items().len(),
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_creation_failed_total").increment(1);
                tracing::warn!(error = %e, "order creation failed");
            }
        }
        result
    }

    async fn place(&self, user_id: UserId, request: PlaceOrder) -> Result<Order> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(CheckoutError::NotFound(Missing::User(user_id)));
        }

        let mut tx = self.store.begin().await?;

        let cart = tx.lock_cart(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = tx.get_product(&line.product_id).await?.ok_or_else(|| {
                CheckoutError::NotFound(Missing::Product(line.product_id.clone()))
            })?;
            if !product.active {
                return Err(CheckoutError::ProductUnavailable {
                    product_id: product.id,
                    reason: Unavailable::Inactive,
                });
            }
            items.push(OrderItem::snapshot(&product, line.quantity)?);
        }

        let billing_address = request
            .billing_address
            .unwrap_or_else(|| request.shipping_address.clone());
        let mut order = Order::place(NewOrder {
            user_id,
            order_number: OrderNumber::generate(),
            items,
            shipping_address: request.shipping_address,
            billing_address,
        })?;

        for item in order.items() {
            self.ledger
                .reserve(&mut tx, item.product_id(), item.quantity())
                .await?;
        }

        let version = tx.insert_order(&order).await?;
        order.set_version(version);
        tx.clear_cart(user_id).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Gets an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::NotFound(Missing::Order(order_id)))
    }

    /// Gets an order by its order number.
    pub async fn get_order_by_number(&self, order_number: &OrderNumber) -> Result<Order> {
        self.store
            .get_order_by_number(order_number)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(Missing::OrderNumber(order_number.clone())))
    }

    /// Lists a page of a user's orders, newest first.
    pub async fn orders_for_user(
        &self,
        user_id: UserId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(CheckoutError::NotFound(Missing::User(user_id)));
        }
        Ok(self.store.list_orders(filter.with_user(user_id)).await?)
    }

    /// Lists a page of orders matching the filter, newest first.
    pub async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(filter).await?)
    }

    /// Cancels an order and restores its reserved stock.
    ///
    /// Cancelling an already cancelled order is a no-op and restores nothing.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Transition> {
        self.apply(order_id, LifecycleEvent::Cancel, None).await
    }

    /// Applies an admin fulfilment event (start processing, ship, deliver,
    /// return, or cancel).
    #[tracing::instrument(skip(self))]
    pub async fn advance(&self, order_id: OrderId, event: LifecycleEvent) -> Result<Transition> {
        if matches!(
            event,
            LifecycleEvent::PaymentCompleted | LifecycleEvent::PaymentFailed
        ) {
            let order = self.get_order(order_id).await?;
            return Err(CheckoutError::InvalidTransition {
                status: order.status(),
                payment_status: order.payment_status(),
                event,
            });
        }
        self.apply(order_id, event, None).await
    }

    /// Records a payment outcome. Re-applying the same outcome is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn apply_payment_result(
        &self,
        order_id: OrderId,
        completed: bool,
        gateway_payment_id: Option<&str>,
    ) -> Result<Transition> {
        let event = if completed {
            LifecycleEvent::PaymentCompleted
        } else {
            LifecycleEvent::PaymentFailed
        };
        self.apply(order_id, event, gateway_payment_id).await
    }

    /// Records the gateway session id on an order.
    pub(crate) async fn attach_session(&self, order_id: OrderId, session_id: &str) -> Result<Order> {
        let mut attempt = 1;
        loop {
            let mut tx = self.store.begin().await?;
            let mut order = tx
                .get_order_for_update(order_id)
                .await?
                .ok_or(CheckoutError::NotFound(Missing::Order(order_id)))?;
            order.attach_session(session_id);

            match tx.update_order(&order).await {
                Ok(version) => {
                    tx.commit().await?;
                    order.set_version(version);
                    return Ok(order);
                }
                Err(store::StoreError::ConcurrencyConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs a lifecycle event in its own transaction, retrying on version
    /// conflicts.
    async fn apply(
        &self,
        order_id: OrderId,
        event: LifecycleEvent,
        gateway_payment_id: Option<&str>,
    ) -> Result<Transition> {
        let mut attempt = 1;
        loop {
            let mut tx = self.store.begin().await?;
            match self
                .apply_in(&mut tx, order_id, event, gateway_payment_id)
                .await
            {
                Ok(transition) => {
                    tx.commit().await?;
                    return Ok(transition);
                }
                Err(CheckoutError::ConcurrencyConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(%order_id, attempt, "order changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Applies a lifecycle event inside the caller's transaction.
    ///
    /// Restores stock for every item when the event cancels the order. Does
    /// not write anything when the event leaves the order unchanged.
    pub(crate) async fn apply_in(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        event: LifecycleEvent,
        gateway_payment_id: Option<&str>,
    ) -> Result<Transition> {
        let mut order = tx
            .get_order_for_update(order_id)
            .await?
            .ok_or(CheckoutError::NotFound(Missing::Order(order_id)))?;
        let from = order.lifecycle();

        let step = order.apply(event)?;
        if !step.is_advanced() {
            tracing::debug!(
                order_number = %order.order_number(),
                %event,
                "event already applied"
            );
            return Ok(Transition { order, step });
        }

        if event == LifecycleEvent::PaymentCompleted
            && let Some(payment_id) = gateway_payment_id
        {
            order.record_gateway_payment(payment_id);
        }

        if event == LifecycleEvent::Cancel {
            for item in order.items() {
                self.ledger
                    .restore(tx, item.product_id(), item.quantity())
                    .await?;
            }
        }

        let version = tx.update_order(&order).await?;
        order.set_version(version);

        metrics::counter!("order_transitions_total", "event" => event.name()).increment(1);
        tracing::info!(
            order_number = %order.order_number(),
            %event,
            from_status = %from.status,
            to_status = %order.status(),
            payment_status = %order.payment_status(),
            "order transitioned"
        );

        Ok(Transition { order, step })
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, ProductId};
    use domain::{Cart, OrderStatus, PaymentStatus, Product, User};
    use store::InMemoryStore;

    use super::*;

    struct Fixture {
        store: InMemoryStore,
        service: OrderService<InMemoryStore>,
        user_id: UserId,
    }

    async fn fixture(stock_a: u32, stock_b: u32) -> Fixture {
        let store = InMemoryStore::new();
        let user = User::new(UserId::new(), "Ada", "Lovelace", "ada@example.com");
        store.put_user(&user).await.unwrap();
        store
            .put_product(&Product::new("A", "Widget", Money::from_minor(1000), stock_a))
            .await
            .unwrap();
        store
            .put_product(&Product::new("B", "Gadget", Money::from_minor(250), stock_b))
            .await
            .unwrap();
        Fixture {
            service: OrderService::new(store.clone()),
            store,
            user_id: user.id,
        }
    }

    impl Fixture {
        async fn fill_cart(&self, lines: &[(&str, u32)]) {
            let mut cart = Cart::new(self.user_id);
            for (id, quantity) in lines {
                let product = self
                    .store
                    .get_product(&ProductId::new(*id))
                    .await
                    .unwrap()
                    .unwrap();
                cart.add_item(&product, *quantity).unwrap();
            }
            let mut tx = self.store.begin().await.unwrap();
            tx.save_cart(&cart).await.unwrap();
            tx.commit().await.unwrap();
        }

        async fn stock(&self, id: &str) -> u32 {
            self.store
                .get_product(&ProductId::new(id))
                .await
                .unwrap()
                .unwrap()
                .stock_quantity
        }

        async fn checkout(&self) -> Result<Order> {
            self.service
                .create_order(self.user_id, PlaceOrder::new("1 Ship St"))
                .await
        }
    }

    #[tokio::test]
    async fn create_order_reserves_and_clears_cart() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 2)]).await;

        let order = fx.checkout().await.unwrap();

        assert_eq!(order.total_amount(), Money::from_minor(2000));
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.billing_address(), "1 Ship St");
        assert_eq!(fx.stock("A").await, 3);
        assert!(fx.store.get_cart(fx.user_id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let fx = fixture(5, 1).await;
        fx.fill_cart(&[("A", 2), ("B", 1)]).await;
        fx.store
            .put_product(&Product::new("B", "Gadget", Money::from_minor(250), 0))
            .await
            .unwrap();

        let err = fx.checkout().await.unwrap_err();

        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
        assert_eq!(fx.stock("A").await, 5);
        assert_eq!(fx.store.order_count().await, 0);
        assert_eq!(
            fx.store.get_cart(fx.user_id).await.unwrap().unwrap().items().len(),
            2
        );
    }

    #[tokio::test]
    async fn empty_cart_and_unknown_user_rejected() {
        let fx = fixture(5, 5).await;
        assert!(matches!(
            fx.checkout().await.unwrap_err(),
            CheckoutError::EmptyCart
        ));

        let err = fx
            .service
            .create_order(UserId::new(), PlaceOrder::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(Missing::User(_))));
    }

    #[tokio::test]
    async fn cancel_restores_stock_once() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 2), ("B", 1)]).await;
        let order = fx.checkout().await.unwrap();
        assert_eq!((fx.stock("A").await, fx.stock("B").await), (3, 9));

        let first = fx.service.cancel(order.id()).await.unwrap();
        assert!(first.is_advanced());
        assert_eq!(first.order.status(), OrderStatus::Cancelled);
        assert_eq!((fx.stock("A").await, fx.stock("B").await), (5, 10));

        let second = fx.service.cancel(order.id()).await.unwrap();
        assert!(!second.is_advanced());
        assert_eq!((fx.stock("A").await, fx.stock("B").await), (5, 10));
    }

    #[tokio::test]
    async fn cancel_delivered_order_is_rejected() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 1)]).await;
        let order = fx.checkout().await.unwrap();

        fx.service
            .apply_payment_result(order.id(), true, Some("cf_1"))
            .await
            .unwrap();
        for event in [LifecycleEvent::Ship, LifecycleEvent::Deliver] {
            fx.service.advance(order.id(), event).await.unwrap();
        }

        let err = fx.service.cancel(order.id()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition { .. }));

        let reloaded = fx.service.get_order(order.id()).await.unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Delivered);
        assert_eq!(fx.stock("A").await, 4);
    }

    #[tokio::test]
    async fn payment_result_is_idempotent() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 1)]).await;
        let order = fx.checkout().await.unwrap();

        let first = fx
            .service
            .apply_payment_result(order.id(), true, Some("cf_1"))
            .await
            .unwrap();
        assert!(first.is_advanced());
        assert_eq!(first.order.status(), OrderStatus::Confirmed);
        assert_eq!(first.order.gateway_payment_id(), Some("cf_1"));

        let second = fx
            .service
            .apply_payment_result(order.id(), true, Some("cf_1"))
            .await
            .unwrap();
        assert!(!second.is_advanced());
        assert_eq!(second.order.version(), first.order.version());
    }

    #[tokio::test]
    async fn failed_payment_keeps_status() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 1)]).await;
        let order = fx.checkout().await.unwrap();

        let transition = fx
            .service
            .apply_payment_result(order.id(), false, None)
            .await
            .unwrap();
        assert_eq!(transition.order.payment_status(), PaymentStatus::Failed);
        assert_eq!(transition.order.status(), OrderStatus::Processing);
    }

    #[tokio::test]
    async fn payment_events_are_not_admin_transitions() {
        let fx = fixture(5, 10).await;
        fx.fill_cart(&[("A", 1)]).await;
        let order = fx.checkout().await.unwrap();

        let err = fx
            .service
            .advance(order.id(), LifecycleEvent::PaymentCompleted)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn orders_listed_newest_first() {
        let fx = fixture(50, 10).await;
        let mut numbers = Vec::new();
        for _ in 0..3 {
            fx.fill_cart(&[("A", 1)]).await;
            numbers.push(fx.checkout().await.unwrap().order_number().clone());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let listed: Vec<_> = fx
            .service
            .orders_for_user(fx.user_id, OrderFilter::new())
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.order_number().clone())
            .collect();
        numbers.reverse();
        assert_eq!(listed, numbers);

        let second_page = fx
            .service
            .orders_for_user(fx.user_id, OrderFilter::new().limit(2).offset(2))
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].order_number(), &numbers[2]);

        let found = fx.service.get_order_by_number(&numbers[0]).await.unwrap();
        assert_eq!(found.order_number(), &numbers[0]);
    }
}
