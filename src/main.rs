use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use storefront_checkout::api;
use storefront_checkout::api::checkout::CheckoutState;
use storefront_checkout::config::AppConfig;
use storefront_checkout::database::order_repository::OrderRepository;
use storefront_checkout::database::transaction_repository::CaptureTransactionRepository;
use storefront_checkout::database::{init_pool, PoolConfig};
use storefront_checkout::logging::init_tracing;
use storefront_checkout::payments::client::{CheckoutClient, CheckoutConfig};
use storefront_checkout::services::reconciler::{OrderReconciler, ReconcilerConfig};
use storefront_checkout::workers::pending_payment_monitor::{
    MonitorConfig, PendingPaymentMonitor,
};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    let checkout_config = CheckoutConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    checkout_config
        .validate()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let pool = init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            connection_timeout: Duration::from_secs(config.database.connection_timeout),
            idle_timeout: Duration::from_secs(config.database.idle_timeout),
        }),
    )
    .await
    .map_err(|e| anyhow::anyhow!("database pool initialization failed: {}", e))?;

    let orders = Arc::new(OrderRepository::new(pool.clone()));
    let captures = Arc::new(CaptureTransactionRepository::new(pool.clone()));
    let checkout_client = Arc::new(
        CheckoutClient::new(checkout_config.clone()).map_err(|e| anyhow::anyhow!("{}", e))?,
    );

    let reconciler = Arc::new(OrderReconciler::new(
        orders.clone(),
        captures,
        checkout_client,
        ReconcilerConfig {
            secret_key: checkout_config.secret_key.clone(),
            skip_bank_selection: checkout_config.skip_bank_selection,
            success_url: config.urls.success_url.clone(),
            cancel_url: config.urls.cancel_url.clone(),
            language: config.urls.language.clone(),
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = PendingPaymentMonitor::new(orders.clone(), MonitorConfig::from_env());
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    let state = CheckoutState { reconciler };
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/checkout/redirect", post(api::checkout::initiate_redirect))
        .route("/checkout/callback", get(api::checkout::handle_callback))
        .route("/checkout/notify", post(api::checkout::handle_notification))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "checkout service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx))
        .await?;

    let _ = monitor_handle.await;
    info!("shutdown complete");
    Ok(())
}
