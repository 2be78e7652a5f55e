//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use domain::{
    Cart, LifecycleEvent, Money, NewOrder, Order, OrderItem, OrderNumber, OrderStatus,
    PaymentStatus, Product, ProductId, User, UserId, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{OrderFilter, PostgresStore, Store, StoreError, StoreTx};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, cart_items, carts, products, users, \
         processed_webhook_events",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed(store: &PostgresStore, stock: u32) -> (User, Product) {
    let user = User::new(UserId::new(), "Ada", "Lovelace", "ada@example.com");
    let product = Product::new("SKU-001", "Widget", Money::from_minor(1000), stock);
    store.put_user(&user).await.unwrap();
    store.put_product(&product).await.unwrap();
    (user, product)
}

fn placed_order(user_id: UserId, quantity: u32) -> Order {
    Order::place(NewOrder {
        user_id,
        order_number: OrderNumber::generate(),
        items: vec![
            OrderItem::new("SKU-001", "Widget", quantity, Money::from_minor(1000)).unwrap(),
        ],
        shipping_address: "1 Ship St".to_string(),
        billing_address: "1 Bill St".to_string(),
    })
    .unwrap()
}

async fn save_cart(store: &PostgresStore, cart: &Cart) {
    let mut tx = store.begin().await.unwrap();
    tx.lock_cart(cart.user_id()).await.unwrap();
    tx.save_cart(cart).await.unwrap();
    tx.commit().await.unwrap();
}

/// Runs one checkout of the user's cart; false when the cart was empty.
async fn checkout_cart(store: PostgresStore, user_id: UserId) -> bool {
    let mut tx = store.begin().await.unwrap();
    let cart = tx.lock_cart(user_id).await.unwrap();
    if cart.is_empty() {
        return false;
    }
    let quantity = cart.total_quantity();
    tx.reserve_stock(&ProductId::new("SKU-001"), quantity)
        .await
        .unwrap();
    tx.insert_order(&placed_order(user_id, quantity))
        .await
        .unwrap();
    tx.clear_cart(user_id).await.unwrap();
    tx.commit().await.unwrap();
    true
}

async fn stock(store: &PostgresStore) -> u32 {
    store
        .get_product(&ProductId::new("SKU-001"))
        .await
        .unwrap()
        .unwrap()
        .stock_quantity
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn collaborator_records_round_trip() {
    let store = get_test_store().await;
    let (user, product) = seed(&store, 5).await;

    assert_eq!(store.get_user(user.id).await.unwrap(), Some(user));
    assert_eq!(store.get_product(&product.id).await.unwrap(), Some(product));
    assert!(store.get_user(UserId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn cart_lines_keep_their_order() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;
    let gadget = Product::new("SKU-002", "Gadget", Money::from_minor(250), 10);
    store.put_product(&gadget).await.unwrap();

    let mut cart = Cart::new(user.id);
    cart.add_item(&gadget, 3).unwrap();
    cart.add_item(&widget, 1).unwrap();
    save_cart(&store, &cart).await;

    let loaded = store.get_cart(user.id).await.unwrap().unwrap();
    let ids: Vec<_> = loaded.items().iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(ids, ["SKU-002", "SKU-001"]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn reserve_insert_and_clear_commit_together() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;
    let mut cart = Cart::new(user.id);
    cart.add_item(&widget, 2).unwrap();
    save_cart(&store, &cart).await;

    let order = placed_order(user.id, 2);
    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.reserve_stock(&widget.id, 2).await.unwrap(), 3);
    assert_eq!(tx.insert_order(&order).await.unwrap(), Version::inserted());
    tx.clear_cart(user.id).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(stock(&store).await, 3);
    assert!(store.get_cart(user.id).await.unwrap().unwrap().is_empty());

    let loaded = store.get_order(order.id()).await.unwrap().unwrap();
    assert_eq!(loaded.order_number(), order.order_number());
    assert_eq!(loaded.total_amount(), Money::from_minor(2000));
    assert_eq!(loaded.status(), OrderStatus::Processing);
    assert_eq!(loaded.payment_status(), PaymentStatus::Pending);
    assert_eq!(loaded.version(), Version::inserted());

    let by_number = store
        .get_order_by_number(order.order_number())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_number.id(), order.id());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn rollback_discards_reservation() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.reserve_stock(&widget.id, 4).await.unwrap();
        tx.insert_order(&placed_order(user.id, 4)).await.unwrap();
    }

    assert_eq!(stock(&store).await, 5);
    assert!(store.list_orders(OrderFilter::new()).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn insufficient_stock_reports_availability() {
    let store = get_test_store().await;
    let (_, widget) = seed(&store, 1).await;

    let mut tx = store.begin().await.unwrap();
    let result = tx.reserve_stock(&widget.id, 2).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientStock {
            requested: 2,
            available: 1,
            ..
        })
    ));

    let result = tx.reserve_stock(&ProductId::new("missing"), 1).await;
    assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    seed(&store, 3).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await?;
            tx.reserve_stock(&ProductId::new("SKU-001"), 1).await?;
            tx.commit().await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(stock(&store).await, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn stale_update_is_a_conflict() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;

    let order = placed_order(user.id, 1);
    let mut tx = store.begin().await.unwrap();
    tx.reserve_stock(&widget.id, 1).await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let stale = store.get_order(order.id()).await.unwrap().unwrap();

    let mut tx = store.begin().await.unwrap();
    let mut fresh = tx.get_order_for_update(order.id()).await.unwrap().unwrap();
    fresh.apply(LifecycleEvent::PaymentCompleted).unwrap();
    assert_eq!(tx.update_order(&fresh).await.unwrap(), Version::new(2));
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let result = tx.update_order(&stale).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { expected, actual, .. })
            if expected == Version::inserted() && actual == Version::new(2)
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn filters_and_orders_listings() {
    let store = get_test_store().await;
    let (user, _) = seed(&store, 10).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let order = placed_order(user.id, 1);
        ids.push(order.id());
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let mut tx = store.begin().await.unwrap();
    let mut paid = tx.get_order_for_update(ids[0]).await.unwrap().unwrap();
    paid.apply(LifecycleEvent::PaymentCompleted).unwrap();
    tx.update_order(&paid).await.unwrap();
    tx.commit().await.unwrap();

    let listed: Vec<_> = store
        .list_orders(OrderFilter::for_user(user.id))
        .await
        .unwrap()
        .iter()
        .map(|o| o.id())
        .collect();
    assert_eq!(listed, [ids[2], ids[1], ids[0]]);

    let page: Vec<_> = store
        .list_orders(OrderFilter::for_user(user.id).limit(1).offset(1))
        .await
        .unwrap()
        .iter()
        .map(|o| o.id())
        .collect();
    assert_eq!(page, [ids[1]]);
    assert!(
        store
            .list_orders(OrderFilter::for_user(UserId::new()))
            .await
            .unwrap()
            .is_empty()
    );

    let confirmed = store
        .list_orders(OrderFilter::new().with_status(OrderStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id(), ids[0]);

    let pending = store
        .list_orders(OrderFilter::new().with_payment_status(PaymentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn webhook_event_keys_recorded_once() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.mark_event_processed("evt_1").await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(!tx.mark_event_processed("evt_1").await.unwrap());
    assert!(tx.mark_event_processed("evt_2").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn double_submitted_checkout_places_one_order() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;
    let mut cart = Cart::new(user.id);
    cart.add_item(&widget, 2).unwrap();
    save_cart(&store, &cart).await;

    let first = tokio::spawn(checkout_cart(store.clone(), user.id));
    let second = tokio::spawn(checkout_cart(store.clone(), user.id));
    let placed = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(placed.iter().filter(|p| **p).count(), 1);
    assert_eq!(stock(&store).await, 3);
    assert_eq!(
        store
            .list_orders(OrderFilter::for_user(user.id))
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(store.get_cart(user.id).await.unwrap().unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn cart_edit_waits_for_checkout_and_sees_it() {
    let store = get_test_store().await;
    let (user, widget) = seed(&store, 5).await;
    let mut cart = Cart::new(user.id);
    cart.add_item(&widget, 2).unwrap();
    save_cart(&store, &cart).await;

    let mut checkout = store.begin().await.unwrap();
    assert_eq!(checkout.lock_cart(user.id).await.unwrap().total_quantity(), 2);

    let edit = tokio::spawn({
        let store = store.clone();
        let user_id = user.id;
        async move {
            let mut tx = store.begin().await.unwrap();
            let cart = tx.lock_cart(user_id).await.unwrap();
            tx.commit().await.unwrap();
            cart
        }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!edit.is_finished());

    checkout.clear_cart(user.id).await.unwrap();
    checkout.commit().await.unwrap();

    assert!(edit.await.unwrap().is_empty());
}
