//! Mock payment gateway for tests and local development.
//!
//! Scriptable per-call behavior: settle, decline, or time out recurring
//! charges. Records every request for assertions. Notifications decode
//! through a real [`EnvelopeCodec`] so tests can seal valid envelopes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::billing::IpnNotification;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ChallengeOutcome, ChallengeVerification, GatewayError, HostedPaymentRedirect,
    HostedPaymentRequest, PaymentGateway, RecurringChargeOutcome, RecurringChargeRequest,
};

use super::envelope::EnvelopeCodec;

/// Signature secret the mock codec is initialized with.
pub const MOCK_SIGNATURE_SECRET: &str = "mock_signature_secret";

/// Behavior of the mock for recurring charges.
#[derive(Debug, Clone)]
enum ChargeBehavior {
    Settle { roll_token: Option<String> },
    Decline { message: String },
    TimeOut,
}

/// Scriptable in-memory payment gateway.
pub struct MockPaymentGateway {
    codec: EnvelopeCodec,
    behavior: Mutex<ChargeBehavior>,
    charge_requests: Mutex<Vec<RecurringChargeRequest>>,
    hosted_requests: Mutex<Vec<HostedPaymentRequest>>,
}

impl MockPaymentGateway {
    /// A gateway that settles every charge.
    pub fn settling() -> Self {
        Self::with_behavior(ChargeBehavior::Settle { roll_token: None })
    }

    /// A gateway that settles every charge and issues a rolling token.
    pub fn settling_with_token(token: impl Into<String>) -> Self {
        Self::with_behavior(ChargeBehavior::Settle {
            roll_token: Some(token.into()),
        })
    }

    /// A gateway that declines every charge.
    pub fn declining(message: impl Into<String>) -> Self {
        Self::with_behavior(ChargeBehavior::Decline {
            message: message.into(),
        })
    }

    /// A gateway that times out on every charge.
    pub fn timing_out() -> Self {
        Self::with_behavior(ChargeBehavior::TimeOut)
    }

    fn with_behavior(behavior: ChargeBehavior) -> Self {
        Self {
            codec: EnvelopeCodec::new(MOCK_SIGNATURE_SECRET),
            behavior: Mutex::new(behavior),
            charge_requests: Mutex::new(Vec::new()),
            hosted_requests: Mutex::new(Vec::new()),
        }
    }

    /// Seals a notification the way the real gateway would.
    pub fn seal_notification(&self, notification: &IpnNotification) -> Vec<u8> {
        self.codec.seal(notification)
    }

    /// Recurring charge requests received so far.
    pub fn charge_requests(&self) -> Vec<RecurringChargeRequest> {
        self.charge_requests.lock().unwrap().clone()
    }

    /// Hosted payment requests received so far.
    pub fn hosted_requests(&self) -> Vec<HostedPaymentRequest> {
        self.hosted_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn start_hosted_payment(
        &self,
        request: HostedPaymentRequest,
    ) -> Result<HostedPaymentRedirect, GatewayError> {
        self.hosted_requests.lock().unwrap().push(request.clone());

        let mut form_data = HashMap::new();
        form_data.insert("order_id".to_string(), request.order_id.to_string());
        form_data.insert("amount".to_string(), request.amount_minor.to_string());
        form_data.insert("signature".to_string(), "mock-signature".to_string());

        Ok(HostedPaymentRedirect {
            redirect_url: "https://mock.gateway/pay".to_string(),
            form_data,
        })
    }

    async fn start_recurring_charge(
        &self,
        request: RecurringChargeRequest,
    ) -> Result<RecurringChargeOutcome, GatewayError> {
        self.charge_requests.lock().unwrap().push(request.clone());

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ChargeBehavior::Settle { roll_token } => Ok(RecurringChargeOutcome {
                success: true,
                external_transaction_id: Some(format!("mock-tx-{}", request.order_id)),
                status: "paid".to_string(),
                new_token: roll_token,
                new_token_expiry: Some(Timestamp::now().add_days(365)),
                error: None,
            }),
            ChargeBehavior::Decline { message } => Ok(RecurringChargeOutcome {
                success: false,
                external_transaction_id: None,
                status: "rejected".to_string(),
                new_token: None,
                new_token_expiry: None,
                error: Some(message),
            }),
            ChargeBehavior::TimeOut => Err(GatewayError::timeout("mock gateway timed out")),
        }
    }

    async fn verify_challenge_response(
        &self,
        _request: ChallengeVerification,
    ) -> Result<ChallengeOutcome, GatewayError> {
        Ok(ChallengeOutcome {
            status: "verified".to_string(),
            payment_settled: true,
        })
    }

    fn decode_notification(&self, payload: &[u8]) -> Result<IpnNotification, GatewayError> {
        self.codec.verify_and_decode(payload)
    }
}
