//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for billing-related API
//! endpoints and wires them to their corresponding handlers.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, create_checkout, get_subscription, handle_payment_notification,
    list_plans, repair_subscription, run_expiry, run_renewals, verify_challenge, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `GET /plans` - List the plan catalog
/// - `GET /subscription` - Current subscription details
/// - `POST /checkout` - Start a hosted-payment checkout
/// - `POST /checkout/challenge` - Complete a 3-DS challenge
/// - `POST /cancel` - Cancel the current subscription
///
/// ## Cron Endpoints (shared-secret bearer token)
/// - `POST /cron/renewals` - Run the renewal sweep
/// - `POST /cron/expire` - Run the expiry sweep
/// - `POST /cron/repair` - Reconcile a lagging subscription
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        // User endpoints
        .route("/plans", get(list_plans))
        .route("/subscription", get(get_subscription))
        .route("/checkout", post(create_checkout))
        .route("/checkout/challenge", post(verify_challenge))
        .route("/cancel", post(cancel_subscription))
        // Cron endpoints
        .route("/cron/renewals", post(run_renewals))
        .route("/cron/expire", post(run_expiry))
        .route("/cron/repair", post(repair_subscription))
}

/// Create the payment webhook router.
///
/// Separate from the billing routes because notifications carry no user
/// authentication; they are verified by envelope signature instead.
///
/// # Routes
/// - `POST /payment` - Gateway payment notification (IPN)
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/payment", post(handle_payment_notification))
}

/// Create the complete billing module router.
///
/// Combines user/cron routes and webhook routes into a single router
/// suitable for mounting at `/api`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
