//! Instant Payment Notification model.
//!
//! The gateway reports transaction outcomes asynchronously through signed
//! notification envelopes. The adapter layer verifies and decodes the
//! envelope; this module is the typed payload the reconciler consumes, plus
//! the canonical success rule.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{OrderId, Timestamp};

use super::OrderStatus;

/// Gateway action codes that indicate a settled payment.
///
/// The gateway reports `confirmed` for one-off charges and `paid` for
/// recurring token charges; everything else is a non-success action.
const SUCCESS_ACTIONS: [&str; 2] = ["confirmed", "paid"];

/// A decoded payment notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpnNotification {
    /// Order this notification refers to.
    pub order_id: OrderId,

    /// Gateway action/status code, e.g. "confirmed", "paid", "rejected".
    pub action: String,

    /// Gateway error code; zero means no error.
    pub error_code: i32,

    /// Gateway error message, if any.
    pub error_message: Option<String>,

    /// Settled amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Gateway transaction reference.
    pub external_transaction_id: String,

    /// Masked payment instrument, e.g. "4111XXXXXXXX1111".
    pub masked_pan: Option<String>,

    /// Recurring charge token issued or rolled with this payment.
    pub token: Option<String>,

    /// Expiry of the issued token.
    pub token_expiry: Option<Timestamp>,

    /// True when this payment establishes a recurring setup.
    pub recurring_setup: bool,

    /// When the gateway generated the notification.
    pub timestamp: Timestamp,
}

impl IpnNotification {
    /// Computes the terminal order status this notification implies.
    ///
    /// A payment is COMPLETED only when the action indicates success AND
    /// the error code is zero. A success action accompanied by a non-zero
    /// error code is FAILED - the stricter of the two historical rules,
    /// applied uniformly.
    pub fn payment_status(&self) -> OrderStatus {
        let action_ok = SUCCESS_ACTIONS
            .iter()
            .any(|a| self.action.eq_ignore_ascii_case(a));
        if action_ok && self.error_code == 0 {
            OrderStatus::Completed
        } else {
            OrderStatus::Failed
        }
    }

    /// Human-readable failure reason for ledger recording.
    pub fn failure_reason(&self) -> String {
        match &self.error_message {
            Some(msg) => format!("{} (code {})", msg, self.error_code),
            None => format!("gateway action '{}' code {}", self.action, self.error_code),
        }
    }
}
