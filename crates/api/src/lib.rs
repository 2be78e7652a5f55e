//! HTTP API server with observability for the checkout system.
//!
//! Provides REST endpoints for carts, checkout, order lifecycle and payment
//! reconciliation, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CartService, CashfreeConfig, CashfreeGateway, GatewayError, GatewayMode, InventoryLedger,
    OrderService, PaymentGateway, PaymentService, PaymentSettings, SandboxGateway,
    WebhookVerifier,
};
use domain::{Money, Product, User, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{Store, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::PaymentConfig;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub inventory: InventoryLedger<S>,
    pub payments: PaymentService<S>,
}

impl<S: Store> AppState<S> {
    /// Wires every service to `store` and the selected gateway.
    pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, payment: &PaymentConfig) -> Self {
        let orders = OrderService::new(store.clone());
        let payments = PaymentService::new(
            orders.clone(),
            gateway,
            WebhookVerifier::new(payment.webhook_secret.clone()),
            PaymentSettings {
                currency: payment.currency.clone(),
                return_url: payment.return_url.clone(),
                notify_url: payment.notify_url.clone(),
            },
        );
        Self {
            carts: CartService::new(store.clone()),
            inventory: InventoryLedger::new(store),
            orders,
            payments,
        }
    }
}

/// Builds the gateway named by the configuration.
pub fn build_gateway(payment: &PaymentConfig) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
    match payment.mode {
        GatewayMode::Sandbox => Ok(Arc::new(SandboxGateway::new())),
        GatewayMode::Live => {
            let config = CashfreeConfig {
                base_url: payment.base_url.clone(),
                app_id: payment.app_id.clone().unwrap_or_default(),
                secret_key: payment.secret_key.clone().unwrap_or_default(),
                api_version: payment.api_version.clone(),
                timeout: payment.timeout,
            };
            Ok(Arc::new(CashfreeGateway::new(config)?))
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/users/{user_id}/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/users/{user_id}/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/users/{user_id}/cart/items/{product_id}",
            put(routes::cart::update_item::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route(
            "/users/{user_id}/orders",
            post(routes::orders::checkout::<S>).get(routes::orders::list_for_user::<S>),
        )
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/by-number/{order_number}", get(routes::orders::get_by_number::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/transitions", post(routes::orders::transition::<S>))
        .route(
            "/orders/{id}/payment-session",
            post(routes::payment::create_session::<S>),
        )
        .route("/payment/verify", post(routes::payment::verify::<S>))
        .route("/payment/return", get(routes::payment::return_from_gateway::<S>))
        .route("/payment/webhook", post(routes::payment::webhook::<S>))
        .route("/products/{id}/restock", post(routes::products::restock::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Id of the user created by [`seed_demo_data`].
pub fn demo_user_id() -> UserId {
    UserId::from_uuid(uuid::Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001))
}

/// Loads a demo user and a small catalog.
pub async fn seed_demo_data<S: Store>(store: &S) -> Result<UserId, StoreError> {
    let user = User::new(demo_user_id(), "Demo", "Customer", "demo@example.com")
        .with_phone("9999999999");
    store.put_user(&user).await?;

    for product in [
        Product::new("SKU-001", "Wireless Mouse", Money::from_minor(79_900), 50),
        Product::new("SKU-002", "Mechanical Keyboard", Money::from_minor(349_900), 20),
        Product::new("SKU-003", "USB-C Cable", Money::from_minor(19_900), 200),
        Product::new("SKU-004", "Laptop Stand", Money::from_minor(129_900), 0),
    ] {
        store.put_product(&product).await?;
    }

    tracing::info!(user_id = %user.id, "demo data seeded");
    Ok(user.id)
}
