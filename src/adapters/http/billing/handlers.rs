//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CheckoutPolicy, ExpireLapsedHandler,
    GetSubscriptionHandler, GetSubscriptionQuery, ReconcileIpnCommand, ReconcileIpnHandler,
    RenewalPolicy, RepairSubscriptionHandler, RunRenewalsHandler, StartCheckoutCommand,
    StartCheckoutHandler, VerifyChallengeHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{
    BillingNotifier, BillingProfileRepository, ChallengeVerification, OrderRepository,
    PaymentGateway, SubscriptionRepository,
};

use super::dto::{
    AckResponse, CancelResponse, ChallengeRequest, ChallengeResponseBody, CheckoutRequest,
    CheckoutResponse, ErrorResponse, ExpiryReportResponse, PlanResponse, RenewalReportResponse,
    RepairRequest, SubscriptionResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all billing dependencies.
///
/// Cloned per request; all dependencies are Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    pub orders: Arc<dyn OrderRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub profiles: Arc<dyn BillingProfileRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn BillingNotifier>,
    pub checkout_policy: CheckoutPolicy,
    pub renewal_policy: RenewalPolicy,
    /// Shared secret for the cron trigger endpoints.
    pub cron_secret: String,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn checkout_handler(&self) -> StartCheckoutHandler {
        StartCheckoutHandler::new(
            self.orders.clone(),
            self.subscriptions.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
            self.checkout_policy.clone(),
        )
    }

    pub fn reconcile_handler(&self) -> ReconcileIpnHandler {
        ReconcileIpnHandler::new(
            self.orders.clone(),
            self.subscriptions.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
        )
    }

    pub fn renewals_handler(&self) -> RunRenewalsHandler {
        RunRenewalsHandler::new(
            self.orders.clone(),
            self.subscriptions.clone(),
            self.profiles.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.renewal_policy.clone(),
        )
    }

    pub fn expire_handler(&self) -> ExpireLapsedHandler {
        ExpireLapsedHandler::new(
            self.subscriptions.clone(),
            self.profiles.clone(),
            self.notifier.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.subscriptions.clone(), self.profiles.clone())
    }

    pub fn subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.subscriptions.clone())
    }

    pub fn repair_handler(&self) -> RepairSubscriptionHandler {
        RepairSubscriptionHandler::new(
            self.orders.clone(),
            self.subscriptions.clone(),
            self.profiles.clone(),
        )
    }

    pub fn challenge_handler(&self) -> VerifyChallengeHandler {
        VerifyChallengeHandler::new(self.gateway.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (would come from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// In production this is populated from the identity provider's token by
/// auth middleware; the development extractor accepts an X-User-Id header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::new(s).ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

/// Checks the cron shared-secret bearer token.
///
/// The scheduler credential is distinct from end-user auth; a mismatch is a
/// 401 with no further processing.
fn require_cron_secret(
    headers: &axum::http::HeaderMap,
    state: &BillingAppState,
) -> Result<(), BillingApiError> {
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == state.cron_secret)
        .unwrap_or(false);

    if authorized {
        Ok(())
    } else {
        Err(BillingApiError(BillingError::Unauthorized))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/plans - List the plan catalog
pub async fn list_plans() -> impl IntoResponse {
    Json(PlanResponse::catalog())
}

/// GET /api/billing/subscription - Current user's subscription
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.subscription_handler();
    let view = handler
        .handle(GetSubscriptionQuery {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(SubscriptionResponse { subscription: view }))
}

/// POST /api/billing/checkout - Start a hosted-payment checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.checkout_handler();
    let cmd = StartCheckoutCommand {
        user_id: user.user_id,
        plan: request.plan,
        billing: request.billing.into(),
    };

    let result = handler.handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /api/billing/checkout/challenge - Complete a 3-DS challenge
pub async fn verify_challenge(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Json(request): Json<ChallengeRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.challenge_handler();
    let outcome = handler
        .handle(ChallengeVerification {
            auth_token: request.auth_token,
            external_transaction_id: request.transaction_id,
            challenge_response: request.challenge_response,
        })
        .await?;

    Ok(Json(ChallengeResponseBody::from(outcome)))
}

/// POST /api/billing/cancel - Cancel the current subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_handler();
    let result = handler
        .handle(CancelSubscriptionCommand {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(CancelResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/payment - Gateway payment notification (IPN)
///
/// Responds 200 with the gateway's acknowledgment shape on success and on
/// internally-handled failure; 400 only for unverifiable payloads; 404 for
/// unknown orders; 500 is reserved for unexpected internal faults.
pub async fn handle_payment_notification(
    State(state): State<BillingAppState>,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.reconcile_handler();
    let cmd = ReconcileIpnCommand {
        payload: body.to_vec(),
    };

    handler.handle(cmd).await?;

    Ok(Json(AckResponse::received()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Cron Endpoints (shared-secret credential)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/cron/renewals - Run the renewal sweep
pub async fn run_renewals(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, BillingApiError> {
    require_cron_secret(&headers, &state)?;

    let handler = state.renewals_handler();
    let report = handler.handle().await?;

    Ok(Json(RenewalReportResponse::from(report)))
}

/// POST /api/billing/cron/expire - Run the expiry sweep
pub async fn run_expiry(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, BillingApiError> {
    require_cron_secret(&headers, &state)?;

    let handler = state.expire_handler();
    let report = handler.handle().await?;

    Ok(Json(ExpiryReportResponse::from(report)))
}

/// POST /api/billing/cron/repair - Reconcile a lagging subscription
pub async fn repair_subscription(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    Json(request): Json<RepairRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    require_cron_secret(&headers, &state)?;

    let user_id = UserId::new(request.user_id)
        .map_err(|e| BillingApiError(BillingError::validation("user_id", e.to_string())))?;

    let handler = state.repair_handler();
    let outcome = handler.handle(&user_id).await?;

    Ok(Json(serde_json::json!({
        "outcome": format!("{:?}", outcome),
    })))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub struct BillingApiError(pub BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::DomainError> for BillingApiError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        Self(BillingError::infrastructure(err.to_string()))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = match &self.0 {
            BillingError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            BillingError::NoActiveSubscription(_) => {
                (StatusCode::CONFLICT, "NO_ACTIVE_SUBSCRIPTION")
            }
            BillingError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "INVALID_PLAN"),
            BillingError::MissingBillingField(_) => {
                (StatusCode::BAD_REQUEST, "MISSING_BILLING_FIELD")
            }
            BillingError::DowngradeNotAllowed { .. } => {
                (StatusCode::CONFLICT, "DOWNGRADE_NOT_ALLOWED")
            }
            BillingError::AlreadyOnPlan(_) => (StatusCode::CONFLICT, "ALREADY_ON_PLAN"),
            BillingError::PaymentFailed { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_FAILED")
            }
            BillingError::InvalidState { .. } => {
                (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
            }
            BillingError::InvalidNotification(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_NOTIFICATION")
            }
            BillingError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            BillingError::ValidationFailed { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
            }
            BillingError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse::new(error_code, self.0.message());
        (status, Json(body)).into_response()
    }
}
