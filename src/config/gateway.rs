//! Payment gateway configuration
//!
//! Everything the gateway client needs is injected from here: endpoints,
//! credentials, timeouts, and TLS verification. There are no process-wide
//! toggles.

use serde::Deserialize;

use super::error::ValidationError;

/// Payment gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API base URL
    pub base_url: String,

    /// URL of the gateway's hosted payment page
    pub hosted_payment_url: String,

    /// Merchant account identifier
    pub merchant_id: String,

    /// API key sent with server-to-server calls
    pub api_key: String,

    /// Shared secret for notification envelope signatures
    pub signature_secret: String,

    /// Publicly reachable URL for asynchronous notifications
    pub notify_url: String,

    /// URL the end user returns to after the hosted flow
    pub return_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TLS certificate verification for gateway calls.
    /// May only be disabled outside production, for sandbox endpoints
    /// with self-signed certificates.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl GatewayConfig {
    /// Check if pointed at the gateway sandbox
    pub fn is_sandbox(&self) -> bool {
        self.base_url.contains("sandbox")
    }

    /// Validate gateway configuration
    pub fn validate(&self, is_production: bool) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_BASE_URL"));
        }
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if self.merchant_id.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_MERCHANT_ID"));
        }
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_API_KEY"));
        }
        if self.signature_secret.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_SIGNATURE_SECRET"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if is_production && !self.verify_tls {
            return Err(ValidationError::TlsVerificationRequired);
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_verify_tls() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        GatewayConfig {
            base_url: "https://sandbox.gateway.example".to_string(),
            hosted_payment_url: "https://sandbox.gateway.example/pay".to_string(),
            merchant_id: "CAMPUS001".to_string(),
            api_key: "key_test_abc".to_string(),
            signature_secret: "sig_secret_xyz".to_string(),
            notify_url: "https://campushub.example/api/webhooks/payment".to_string(),
            return_url: "https://campushub.example/billing/return".to_string(),
            request_timeout_secs: 30,
            verify_tls: true,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate(false).is_ok());
    }

    #[test]
    fn test_is_sandbox() {
        assert!(valid_config().is_sandbox());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = GatewayConfig {
            api_key: String::new(),
            ..valid_config()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_missing_signature_secret_rejected() {
        let config = GatewayConfig {
            signature_secret: String::new(),
            ..valid_config()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let config = GatewayConfig {
            base_url: "ftp://gateway.example".to_string(),
            ..valid_config()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_disabled_tls_allowed_outside_production() {
        let config = GatewayConfig {
            verify_tls: false,
            ..valid_config()
        };
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_disabled_tls_rejected_in_production() {
        let config = GatewayConfig {
            verify_tls: false,
            ..valid_config()
        };
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = GatewayConfig {
            request_timeout_secs: 0,
            ..valid_config()
        };
        assert!(config.validate(false).is_err());
    }
}
