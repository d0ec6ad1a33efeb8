//! Payment gateway port - outbound interface to the hosted payment
//! provider.
//!
//! # Design
//!
//! - **Gateway agnostic**: nothing outside the adapter knows the provider's
//!   wire format or HTTP status conventions; the mapping from gateway
//!   responses to business outcomes is centralized behind this port
//! - **Provisional synchronous results**: `start_recurring_charge` answers
//!   synchronously, but the asynchronous notification remains authoritative
//!   for order finality
//! - **Explicit configuration**: timeouts and TLS verification are injected
//!   into adapters, never process-wide flags

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::billing::{BillingAddress, IpnNotification};
use crate::domain::foundation::{DomainError, OrderId, Timestamp};

/// Port for the hosted payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a hosted (browser-redirect) payment for an order.
    ///
    /// The caller redirects the end user to `redirect_url` with `form_data`
    /// POSTed via a server-constructed auto-submitting form. First-time
    /// payments may tokenize the instrument for later off-session charges.
    async fn start_hosted_payment(
        &self,
        request: HostedPaymentRequest,
    ) -> Result<HostedPaymentRedirect, GatewayError>;

    /// Attempts an off-session charge using a previously captured token.
    ///
    /// Completes or fails synchronously from the caller's perspective; the
    /// gateway may still notify asynchronously for final confirmation.
    async fn start_recurring_charge(
        &self,
        request: RecurringChargeRequest,
    ) -> Result<RecurringChargeOutcome, GatewayError>;

    /// Completes a strong-authentication (3-D-Secure) challenge flow.
    async fn verify_challenge_response(
        &self,
        request: ChallengeVerification,
    ) -> Result<ChallengeOutcome, GatewayError>;

    /// Verifies and decodes a notification envelope into a typed payload.
    ///
    /// # Errors
    ///
    /// `InvalidNotification` for unverifiable or undecodable payloads.
    fn decode_notification(&self, payload: &[u8]) -> Result<IpnNotification, GatewayError>;
}

/// Request to start a hosted payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedPaymentRequest {
    /// External order id, echoed back in notifications.
    pub order_id: OrderId,

    /// Amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Billing details for the payment form.
    pub billing: BillingAddress,

    /// Whether the gateway should tokenize for recurring charges.
    pub setup_recurring: bool,

    /// Webhook URL the gateway notifies asynchronously.
    pub notify_url: String,

    /// URL the end user returns to after the hosted flow.
    pub redirect_url: String,
}

/// Redirect descriptor for the hosted payment flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedPaymentRedirect {
    /// URL of the gateway's hosted payment page.
    pub redirect_url: String,

    /// Fields to POST to the redirect URL as an auto-submitting form.
    pub form_data: HashMap<String, String>,
}

/// Request to charge a stored token off-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringChargeRequest {
    /// External order id for this renewal attempt.
    pub order_id: OrderId,

    /// Amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Previously captured charge token.
    pub token: String,

    /// Billing details on file.
    pub billing: BillingAddress,

    /// Webhook URL for the authoritative confirmation.
    pub notify_url: String,
}

/// Synchronous (provisional) outcome of a recurring charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringChargeOutcome {
    /// Whether the gateway reported the charge as settled.
    pub success: bool,

    /// Gateway transaction reference.
    pub external_transaction_id: Option<String>,

    /// Gateway status string for diagnostics.
    pub status: String,

    /// Rolling token, when the gateway issued a replacement.
    pub new_token: Option<String>,

    /// Expiry of the rolling token.
    pub new_token_expiry: Option<Timestamp>,

    /// Gateway error message when `success` is false.
    pub error: Option<String>,
}

/// Request to verify a 3-D-Secure challenge response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeVerification {
    /// Session token issued when the challenge was raised.
    pub auth_token: String,

    /// Gateway transaction reference under challenge.
    pub external_transaction_id: String,

    /// Challenge response relayed from the issuer page.
    pub challenge_response: String,
}

/// Outcome of a challenge verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    /// Gateway verification status string.
    pub status: String,

    /// Payment status after verification, if the gateway settled it.
    pub payment_settled: bool,
}

/// Errors from payment gateway operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    /// Error code for categorization.
    pub code: GatewayErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl GatewayError {
    /// Create a new gateway error.
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    /// Create a declined error.
    pub fn declined(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Declined, message)
    }

    /// Create a malformed-response error.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::MalformedResponse, message)
    }

    /// Create an invalid-notification error.
    pub fn invalid_notification(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidNotification, message)
    }

    /// True when the gateway gave no definitive answer about the charge.
    ///
    /// The caller must not treat non-response as "not charged": the order
    /// is left open for the authoritative notification to settle.
    pub fn is_indefinite(&self) -> bool {
        matches!(
            self.code,
            GatewayErrorCode::NetworkError | GatewayErrorCode::Timeout
        )
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        use crate::domain::foundation::ErrorCode;

        let code = match err.code {
            GatewayErrorCode::Declined | GatewayErrorCode::InsufficientFunds => {
                ErrorCode::PaymentFailed
            }
            GatewayErrorCode::InvalidNotification => ErrorCode::InvalidNotification,
            _ => ErrorCode::GatewayError,
        };

        DomainError::new(code, err.message)
    }
}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// Request timed out before the gateway answered.
    Timeout,

    /// Gateway answered with an unparseable body.
    MalformedResponse,

    /// Charge was declined.
    Declined,

    /// Insufficient funds.
    InsufficientFunds,

    /// Strong authentication required before the charge can settle.
    ChallengeRequired,

    /// API credential rejected.
    AuthenticationError,

    /// Notification envelope failed verification or decoding.
    InvalidNotification,

    /// Gateway-side fault.
    ProviderError,

    /// Unknown error.
    Unknown,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError | GatewayErrorCode::Timeout
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::MalformedResponse => "malformed_response",
            GatewayErrorCode::Declined => "declined",
            GatewayErrorCode::InsufficientFunds => "insufficient_funds",
            GatewayErrorCode::ChallengeRequired => "challenge_required",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::InvalidNotification => "invalid_notification",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn payment_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn PaymentGateway) {}
    }

    #[test]
    fn gateway_error_retryable() {
        assert!(GatewayErrorCode::NetworkError.is_retryable());
        assert!(GatewayErrorCode::Timeout.is_retryable());

        assert!(!GatewayErrorCode::Declined.is_retryable());
        assert!(!GatewayErrorCode::InvalidNotification.is_retryable());
    }

    #[test]
    fn timeout_and_network_are_indefinite() {
        assert!(GatewayError::timeout("no answer in 30s").is_indefinite());
        assert!(GatewayError::network("connection reset").is_indefinite());

        assert!(!GatewayError::declined("card declined").is_indefinite());
        assert!(!GatewayError::malformed_response("bad json").is_indefinite());
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::declined("Your card was declined");
        assert!(err.to_string().contains("declined"));
        assert!(err.to_string().contains("Your card was declined"));
    }

    #[test]
    fn gateway_error_converts_to_domain_error() {
        let err = GatewayError::declined("Declined");
        let domain_err: DomainError = err.into();
        assert!(domain_err.message().contains("Declined"));
    }
}
