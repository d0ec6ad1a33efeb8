//! HTTP payment gateway adapter.
//!
//! Implements the `PaymentGateway` trait against the hosted payment
//! provider's server-to-server API. This is the only module that knows the
//! gateway's endpoints, field names, and status conventions; everything it
//! returns is already mapped to business outcomes.
//!
//! # Security
//!
//! - Notification envelopes verified with HMAC-SHA256 + constant-time compare
//! - Per-request timeout and TLS verification come from [`GatewayConfig`],
//!   never from process-wide state

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::domain::billing::IpnNotification;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ChallengeOutcome, ChallengeVerification, GatewayError, GatewayErrorCode,
    HostedPaymentRedirect, HostedPaymentRequest, PaymentGateway, RecurringChargeOutcome,
    RecurringChargeRequest,
};

use super::envelope::EnvelopeCodec;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Gateway status strings that indicate a settled charge.
const SETTLED_STATUSES: [&str; 2] = ["paid", "confirmed"];

/// Hosted payment gateway adapter.
pub struct HttpPaymentGateway {
    config: GatewayConfig,
    codec: EnvelopeCodec,
    http_client: reqwest::Client,
}

/// Gateway response for a recurring charge.
#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    error_code: i32,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    token_expiration: Option<Timestamp>,
}

/// Gateway response for a challenge verification.
#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    status: String,
    #[serde(default)]
    payment_status: Option<String>,
}

impl HttpPaymentGateway {
    /// Creates an adapter from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorCode::Unknown, e.to_string()))?;

        let codec = EnvelopeCodec::new(config.signature_secret.clone());

        Ok(Self {
            config,
            codec,
            http_client,
        })
    }

    /// Maps a reqwest transport error to a gateway error.
    ///
    /// Timeouts and connection failures are indefinite: the charge may or
    /// may not have gone through, so callers must not treat them as
    /// declines.
    fn transport_error(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::timeout(e.to_string())
        } else if e.is_connect() {
            GatewayError::network(e.to_string())
        } else {
            GatewayError::new(GatewayErrorCode::Unknown, e.to_string())
        }
    }

    /// Signs hosted-form fields so the gateway can verify their origin.
    fn sign_form(&self, fields: &[(&str, &str)]) -> String {
        let canonical = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut mac = HmacSha256::new_from_slice(self.config.signature_secret.as_bytes())
            .expect("HMAC accepts any key");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn start_hosted_payment(
        &self,
        request: HostedPaymentRequest,
    ) -> Result<HostedPaymentRedirect, GatewayError> {
        // The hosted flow needs no server-to-server call: the browser POSTs
        // a signed form straight to the gateway's payment page.
        let amount = request.amount_minor.to_string();
        let recurring = if request.setup_recurring { "1" } else { "0" };

        let signed_fields: Vec<(&str, &str)> = vec![
            ("merchant_id", self.config.merchant_id.as_str()),
            ("order_id", request.order_id.as_str()),
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("recurring", recurring),
            ("notify_url", request.notify_url.as_str()),
            ("return_url", request.redirect_url.as_str()),
        ];
        let signature = self.sign_form(&signed_fields);

        let mut form_data: HashMap<String, String> = signed_fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        form_data.insert("signature".to_string(), signature);
        form_data.insert("first_name".to_string(), request.billing.first_name);
        form_data.insert("last_name".to_string(), request.billing.last_name);
        form_data.insert("email".to_string(), request.billing.email);
        form_data.insert("phone".to_string(), request.billing.phone);
        form_data.insert("address".to_string(), request.billing.address);

        Ok(HostedPaymentRedirect {
            redirect_url: self.config.hosted_payment_url.clone(),
            form_data,
        })
    }

    async fn start_recurring_charge(
        &self,
        request: RecurringChargeRequest,
    ) -> Result<RecurringChargeOutcome, GatewayError> {
        let url = format!("{}/v2/recurring/charge", self.config.base_url);

        let body = serde_json::json!({
            "merchant_id": self.config.merchant_id,
            "order_id": request.order_id.as_str(),
            "amount": request.amount_minor,
            "currency": request.currency,
            "token_id": request.token,
            "notify_url": request.notify_url,
            "email": request.billing.email,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(GatewayError::new(
                GatewayErrorCode::AuthenticationError,
                "gateway rejected API credential",
            ));
        }
        if status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(error = %error_text, "gateway recurring charge failed server-side");
            return Err(GatewayError::new(
                GatewayErrorCode::ProviderError,
                format!("gateway error: {}", error_text),
            ));
        }

        // Business declines arrive as 200s with an error payload; only the
        // response body decides success.
        let charge: ChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::malformed_response(e.to_string()))?;

        let settled = SETTLED_STATUSES
            .iter()
            .any(|s| charge.status.eq_ignore_ascii_case(s))
            && charge.error_code == 0;

        Ok(RecurringChargeOutcome {
            success: settled,
            external_transaction_id: charge.transaction_id,
            status: charge.status,
            new_token: charge.token_id,
            new_token_expiry: charge.token_expiration,
            error: if settled { None } else { charge.error_message },
        })
    }

    async fn verify_challenge_response(
        &self,
        request: ChallengeVerification,
    ) -> Result<ChallengeOutcome, GatewayError> {
        let url = format!("{}/v2/challenge/verify", self.config.base_url);

        let body = serde_json::json!({
            "merchant_id": self.config.merchant_id,
            "auth_token": request.auth_token,
            "transaction_id": request.external_transaction_id,
            "challenge_response": request.challenge_response,
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::new(
                GatewayErrorCode::ProviderError,
                format!("challenge verification failed: {}", error_text),
            ));
        }

        let verification: ChallengeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::malformed_response(e.to_string()))?;

        let payment_settled = verification
            .payment_status
            .as_deref()
            .map(|s| SETTLED_STATUSES.iter().any(|x| s.eq_ignore_ascii_case(x)))
            .unwrap_or(false);

        Ok(ChallengeOutcome {
            status: verification.status,
            payment_settled,
        })
    }

    fn decode_notification(&self, payload: &[u8]) -> Result<IpnNotification, GatewayError> {
        self.codec.verify_and_decode(payload)
    }
}
