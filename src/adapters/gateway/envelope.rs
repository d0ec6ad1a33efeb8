//! Gateway notification envelope codec.
//!
//! The gateway delivers payment notifications as a JSON envelope carrying
//! the payload string, a generation timestamp, and an HMAC-SHA256 signature
//! over `"{timestamp}.{payload}"`. Verification uses constant-time
//! comparison and rejects stale or future-dated envelopes to prevent
//! replays.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::IpnNotification;
use crate::domain::foundation::{OrderId, Timestamp};
use crate::ports::GatewayError;

/// Maximum allowed age for notification envelopes (5 minutes).
const MAX_ENVELOPE_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future envelopes (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Outer envelope as delivered by the gateway.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    /// JSON-encoded wire payload.
    data: String,

    /// Unix timestamp when the envelope was signed.
    t: i64,

    /// Hex HMAC-SHA256 over `"{t}.{data}"`.
    sig: String,
}

/// Gateway wire payload, field names as the gateway sends them.
#[derive(Debug, Serialize, Deserialize)]
struct WirePayload {
    order_id: String,
    action: String,
    error_code: i32,
    #[serde(default)]
    error_message: Option<String>,
    amount: i64,
    currency: String,
    transaction_id: String,
    #[serde(default)]
    pan_masked: Option<String>,
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    token_expiration: Option<Timestamp>,
    #[serde(default)]
    recurring: bool,
    timestamp: i64,
}

/// Codec for verifying, decoding, and (for simulators) sealing envelopes.
pub struct EnvelopeCodec {
    /// Shared signature secret from the gateway dashboard.
    secret: String,
}

impl EnvelopeCodec {
    /// Creates a codec with the given signature secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies the envelope signature and decodes the payload.
    ///
    /// # Verification Steps
    ///
    /// 1. Parse the outer envelope JSON
    /// 2. Validate the envelope timestamp is within acceptable range
    /// 3. Compute the expected signature with HMAC-SHA256
    /// 4. Compare signatures using constant-time comparison
    /// 5. Decode the inner payload into an [`IpnNotification`]
    ///
    /// # Errors
    ///
    /// `InvalidNotification` for any parse, timestamp, or signature failure.
    /// The caller maps this to a 400 with no state change.
    pub fn verify_and_decode(&self, payload: &[u8]) -> Result<IpnNotification, GatewayError> {
        // 1. Parse envelope
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::invalid_notification(format!("bad envelope: {}", e)))?;

        // 2. Validate timestamp
        self.validate_timestamp(envelope.t)?;

        // 3. Compute expected signature
        let expected = self.compute_signature(envelope.t, &envelope.data);

        // 4. Constant-time compare
        let provided = hex::decode(&envelope.sig)
            .map_err(|_| GatewayError::invalid_notification("signature is not valid hex"))?;
        if !constant_time_compare(&expected, &provided) {
            return Err(GatewayError::invalid_notification("signature mismatch"));
        }

        // 5. Decode payload
        let wire: WirePayload = serde_json::from_str(&envelope.data)
            .map_err(|e| GatewayError::invalid_notification(format!("bad payload: {}", e)))?;

        let order_id = OrderId::new(wire.order_id)
            .map_err(|e| GatewayError::invalid_notification(e.to_string()))?;

        Ok(IpnNotification {
            order_id,
            action: wire.action,
            error_code: wire.error_code,
            error_message: wire.error_message,
            amount_minor: wire.amount,
            currency: wire.currency,
            external_transaction_id: wire.transaction_id,
            masked_pan: wire.pan_masked,
            token: wire.token_id,
            token_expiry: wire.token_expiration,
            recurring_setup: wire.recurring,
            timestamp: Timestamp::from_unix_secs(wire.timestamp.max(0) as u64),
        })
    }

    /// Seals a notification into a signed envelope.
    ///
    /// Used by the mock gateway and by gateway simulators in tests; the
    /// real gateway performs the equivalent on its side.
    pub fn seal(&self, notification: &IpnNotification) -> Vec<u8> {
        let wire = WirePayload {
            order_id: notification.order_id.to_string(),
            action: notification.action.clone(),
            error_code: notification.error_code,
            error_message: notification.error_message.clone(),
            amount: notification.amount_minor,
            currency: notification.currency.clone(),
            transaction_id: notification.external_transaction_id.clone(),
            pan_masked: notification.masked_pan.clone(),
            token_id: notification.token.clone(),
            token_expiration: notification.token_expiry,
            recurring: notification.recurring_setup,
            timestamp: notification.timestamp.as_unix_secs() as i64,
        };

        let data = serde_json::to_string(&wire).expect("wire payload serializes");
        let t = chrono::Utc::now().timestamp();
        let sig = hex::encode(self.compute_signature(t, &data));

        serde_json::to_vec(&Envelope { data, t, sig }).expect("envelope serializes")
    }

    /// Validates that the envelope timestamp is within acceptable bounds.
    fn validate_timestamp(&self, timestamp: i64) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > MAX_ENVELOPE_AGE_SECS {
            return Err(GatewayError::invalid_notification("envelope too old"));
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(GatewayError::invalid_notification(
                "envelope timestamp in the future",
            ));
        }

        Ok(())
    }

    /// Computes the HMAC-SHA256 signature for a timestamp and payload.
    fn compute_signature(&self, timestamp: i64, data: &str) -> Vec<u8> {
        let signed_payload = format!("{}.{}", timestamp, data);
        let mut mac =
            Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key");
        mac.update(signed_payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Performs constant-time comparison of two byte slices.
///
/// This prevents timing attacks that could leak information about the
/// expected signature.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
