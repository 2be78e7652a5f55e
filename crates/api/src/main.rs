//! API server entry point.

use std::process::ExitCode;
use std::sync::Arc;

use api::config::Config;
use api::{AppState, build_gateway, create_app, seed_demo_data};
use checkout::PaymentGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders placed from a cart");
    metrics::describe_counter!("order_creation_failed_total", "Rejected checkouts");
    metrics::describe_histogram!(
        "order_creation_duration_seconds",
        "Time to convert a cart into an order"
    );
    metrics::describe_counter!("inventory_reservations_total", "Stock reservations");
    metrics::describe_counter!(
        "inventory_insufficient_stock_total",
        "Reservations refused for insufficient stock"
    );
    metrics::describe_counter!("inventory_restorations_total", "Stock returned on cancellation");
    metrics::describe_counter!("order_transitions_total", "Lifecycle events applied to orders");
    metrics::describe_counter!(
        "payment_sessions_created_total",
        "Checkout sessions opened at the payment gateway"
    );
    metrics::describe_counter!(
        "payment_verifications_total",
        "Payment verifications by outcome"
    );
    metrics::describe_counter!("webhooks_received_total", "Gateway webhooks by outcome");
}

async fn serve<S: Store>(
    config: &Config,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    if config.seed_demo_data {
        seed_demo_data(&store).await?;
    }

    let gateway = build_gateway(&config.payment)?;
    tracing::info!(mode = %gateway.mode(), "payment gateway ready");

    let state = Arc::new(AppState::new(store, gateway, &config.payment));
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn run(config: Config) -> Result<(), BoxError> {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");
            serve(&config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(&config, InMemoryStore::new(), metrics_handle).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
