//! CampusHub backend entry point.
//!
//! Loads and validates configuration, wires adapters to the billing core,
//! and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use campus_hub::adapters::gateway::HttpPaymentGateway;
use campus_hub::adapters::http::billing::{billing_router, BillingAppState};
use campus_hub::adapters::notify::TracingNotifier;
use campus_hub::adapters::postgres::{
    PostgresBillingProfileRepository, PostgresOrderRepository, PostgresSubscriptionRepository,
};
use campus_hub::application::handlers::billing::{CheckoutPolicy, RenewalPolicy};
use campus_hub::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.server.log_level.clone()))
        .init();

    tracing::info!(
        environment = ?config.server.environment,
        sandbox = config.gateway.is_sandbox(),
        "starting campus-hub"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    let gateway = HttpPaymentGateway::new(config.gateway.clone())?;

    let state = BillingAppState {
        orders: Arc::new(PostgresOrderRepository::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        profiles: Arc::new(PostgresBillingProfileRepository::new(pool.clone())),
        gateway: Arc::new(gateway),
        notifier: Arc::new(TracingNotifier::new()),
        checkout_policy: CheckoutPolicy {
            min_charge_minor: config.billing.min_charge_minor,
            notify_url: config.gateway.notify_url.clone(),
            return_url: config.gateway.return_url.clone(),
        },
        renewal_policy: RenewalPolicy {
            renew_ahead_days: config.billing.renew_ahead_days,
            grace_days: config.billing.grace_days,
            notify_url: config.gateway.notify_url.clone(),
        },
        cron_secret: config.billing.cron_secret.clone(),
    };

    let cors = if config.server.cors_origins_list().is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = config
            .server
            .cors_origins_list()
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    let app = Router::new()
        .nest("/api", billing_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(cors);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
