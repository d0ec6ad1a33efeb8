//! Request/response DTOs for the billing HTTP API.
//!
//! DTOs isolate the wire format from domain types; conversions live here so
//! handlers stay thin.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::application::handlers::billing::{
    CancelSubscriptionResult, ExpiryReport, RenewalReport, StartCheckoutResult, SubscriptionView,
};
use crate::domain::billing::{BillingAddress, PlanTier};
use crate::ports::ChallengeOutcome;

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Plan name, validated by the handler.
    pub plan: String,

    /// Billing details from the checkout form.
    #[serde(default)]
    pub billing: BillingAddressDto,
}

/// Billing address fields as submitted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingAddressDto {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl From<BillingAddressDto> for BillingAddress {
    fn from(dto: BillingAddressDto) -> Self {
        BillingAddress {
            first_name: dto.first_name,
            last_name: dto.last_name,
            email: dto.email,
            phone: dto.phone,
            address: dto.address,
            city: dto.city,
            country: dto.country,
        }
    }
}

/// POST /api/billing/checkout/challenge request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeRequest {
    pub auth_token: String,
    pub transaction_id: String,
    pub challenge_response: String,
}

/// POST /api/billing/cron/repair request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RepairRequest {
    pub user_id: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Redirect descriptor returned by checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub amount_minor: i64,
    pub plan: PlanTier,
    pub redirect_url: String,
    pub form_data: HashMap<String, String>,
}

impl From<StartCheckoutResult> for CheckoutResponse {
    fn from(result: StartCheckoutResult) -> Self {
        Self {
            order_id: result.order_id,
            amount_minor: result.amount_minor,
            plan: result.plan,
            redirect_url: result.redirect.redirect_url,
            form_data: result.redirect.form_data,
        }
    }
}

/// Subscription state returned by cancel.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub plan: PlanTier,
    pub status: String,
    pub end_date: String,
}

impl From<CancelSubscriptionResult> for CancelResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            plan: result.plan,
            status: format!("{:?}", result.status).to_lowercase(),
            end_date: result.end_date.as_datetime().to_rfc3339(),
        }
    }
}

/// GET /api/billing/subscription response.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<SubscriptionView>,
}

/// One catalog row in the plans listing.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub name: &'static str,
    pub price_minor: i64,
    pub currency: &'static str,
    pub rank: u8,
    pub features: &'static [&'static str],
}

impl PlanResponse {
    pub fn catalog() -> Vec<PlanResponse> {
        PlanTier::all()
            .into_iter()
            .map(|tier| PlanResponse {
                name: tier.display_name(),
                price_minor: tier.price_minor(),
                currency: crate::domain::billing::CURRENCY,
                rank: tier.rank(),
                features: tier.features(),
            })
            .collect()
    }
}

/// Challenge verification response.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResponseBody {
    pub status: String,
    pub payment_settled: bool,
}

impl From<ChallengeOutcome> for ChallengeResponseBody {
    fn from(outcome: ChallengeOutcome) -> Self {
        Self {
            status: outcome.status,
            payment_settled: outcome.payment_settled,
        }
    }
}

/// Scheduler run report, returned to operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct RenewalReportResponse {
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub downgraded: u32,
    pub errors: Vec<String>,
}

impl From<RenewalReport> for RenewalReportResponse {
    fn from(report: RenewalReport) -> Self {
        Self {
            processed: report.processed,
            successful: report.successful,
            failed: report.failed,
            downgraded: report.downgraded,
            errors: report.errors,
        }
    }
}

/// Expiry sweep report.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryReportResponse {
    pub scanned: u32,
    pub expired: u32,
    pub downgraded: u32,
}

impl From<ExpiryReport> for ExpiryReportResponse {
    fn from(report: ExpiryReport) -> Self {
        Self {
            scanned: report.scanned,
            expired: report.expired,
            downgraded: report.downgraded,
        }
    }
}

/// Acknowledgment body the gateway expects from the webhook endpoint.
///
/// Returned on both success and internally-handled failure; the gateway
/// only needs confirmation of receipt.
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub error_code: i32,
    pub message: String,
}

impl AckResponse {
    pub fn received() -> Self {
        Self {
            error_code: 0,
            message: "received".to_string(),
        }
    }
}

/// Standard error response shape.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
