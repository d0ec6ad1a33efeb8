//! VerifyChallengeHandler - the 3-D-Secure return leg.
//!
//! Relays the issuer challenge response to the gateway. The verification
//! result is informational for the caller's UI; order finality still comes
//! from the asynchronous notification.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::ports::{ChallengeOutcome, ChallengeVerification, PaymentGateway};

/// Handler for completing a strong-authentication challenge.
pub struct VerifyChallengeHandler {
    gateway: Arc<dyn PaymentGateway>,
}

impl VerifyChallengeHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn handle(
        &self,
        request: ChallengeVerification,
    ) -> Result<ChallengeOutcome, BillingError> {
        let outcome = self
            .gateway
            .verify_challenge_response(request)
            .await
            .map_err(|e| BillingError::payment_failed(e.to_string()))?;

        tracing::info!(
            status = %outcome.status,
            payment_settled = outcome.payment_settled,
            "challenge verification relayed"
        );

        Ok(outcome)
    }
}
