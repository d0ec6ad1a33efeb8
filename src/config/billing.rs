//! Billing policy configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Billing policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Days before expiry the scheduler starts attempting renewal
    #[serde(default = "default_renew_ahead_days")]
    pub renew_ahead_days: i64,

    /// Trailing days after expiry during which renewal is still attempted
    #[serde(default = "default_grace_days")]
    pub grace_days: i64,

    /// Smallest amount ever sent to the gateway, in minor currency units
    #[serde(default = "default_min_charge_minor")]
    pub min_charge_minor: i64,

    /// Shared secret for the cron trigger endpoints, distinct from user auth
    pub cron_secret: String,
}

impl BillingConfig {
    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.renew_ahead_days < 0 || self.grace_days < 0 {
            return Err(ValidationError::InvalidRenewalWindow);
        }
        if self.min_charge_minor < 1 {
            return Err(ValidationError::InvalidMinCharge);
        }
        if self.cron_secret.len() < 16 {
            return Err(ValidationError::CronSecretTooShort);
        }
        Ok(())
    }
}

fn default_renew_ahead_days() -> i64 {
    3
}

fn default_grace_days() -> i64 {
    3
}

fn default_min_charge_minor() -> i64 {
    100
}
