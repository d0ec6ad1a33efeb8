//! Order aggregate - the payment attempt ledger entry.
//!
//! One Order is created per payment attempt: initial purchase, scheduled
//! renewal, or retry. Orders are append-mostly; the only mutation is a
//! single terminal status transition applied by the IPN reconciler (or by
//! synchronous gateway-response handling).
//!
//! # Invariants
//!
//! - `order_id` is globally unique and external-facing
//! - `amount_minor >= 0`
//! - status moves PENDING -> COMPLETED or PENDING -> FAILED, never back

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{OrderId, StateMachine, Timestamp, UserId, ValidationError};

use super::PlanTier;

/// Payment attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting a gateway outcome.
    Pending,

    /// Gateway confirmed the charge.
    Completed,

    /// Gateway declined or the attempt was abandoned.
    Failed,
}

impl StateMachine for OrderStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use OrderStatus::*;
        matches!((self, target), (Pending, Completed) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use OrderStatus::*;
        match self {
            Pending => vec![Completed, Failed],
            Completed | Failed => vec![],
        }
    }
}

/// Order aggregate - one row per payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// External-facing unique id, echoed back by the gateway.
    pub order_id: OrderId,

    /// User the payment is for.
    pub user_id: UserId,

    /// Plan being purchased or renewed.
    pub plan: PlanTier,

    /// Amount in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// Current status in the payment lifecycle.
    pub status: OrderStatus,

    /// True for scheduler-initiated token charges.
    pub is_recurring: bool,

    /// Gateway-issued charge token captured with this payment, if any.
    pub token: Option<String>,

    /// Gateway transaction reference once known.
    pub external_transaction_id: Option<String>,

    /// Last gateway or reconciliation error, if any.
    pub last_error: Option<String>,

    /// When the order was created.
    pub created_at: Timestamp,

    /// When the order was last updated.
    pub updated_at: Timestamp,
}

impl Order {
    /// Creates a new PENDING order.
    ///
    /// The order id is a high-resolution timestamp plus a random suffix so
    /// concurrent checkouts cannot collide.
    ///
    /// # Errors
    ///
    /// Returns an error if `amount_minor` is negative.
    pub fn create(
        user_id: UserId,
        plan: PlanTier,
        amount_minor: i64,
        currency: impl Into<String>,
        is_recurring: bool,
    ) -> Result<Self, ValidationError> {
        if amount_minor < 0 {
            return Err(ValidationError::below_minimum("amount", 0, amount_minor));
        }

        let now = Timestamp::now();
        Ok(Self {
            order_id: Self::generate_order_id(now),
            user_id,
            plan,
            amount_minor,
            currency: currency.into(),
            status: OrderStatus::Pending,
            is_recurring,
            token: None,
            external_transaction_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Generates a globally unique external order id.
    fn generate_order_id(now: Timestamp) -> OrderId {
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}{}", now.as_unix_micros(), &suffix[..8]);
        OrderId::new(id).expect("generated order id is non-empty")
    }

    /// Marks the order completed with the gateway transaction reference.
    ///
    /// Idempotent: completing an already-completed order is a no-op, which
    /// is required for safe notification retries.
    ///
    /// # Errors
    ///
    /// Returns error if the order is FAILED (terminal reversal).
    pub fn complete(
        &mut self,
        external_transaction_id: impl Into<String>,
        token: Option<String>,
    ) -> Result<(), ValidationError> {
        if self.status == OrderStatus::Completed {
            return Ok(());
        }
        self.status = self.status.transition_to(OrderStatus::Completed)?;
        self.external_transaction_id = Some(external_transaction_id.into());
        if token.is_some() {
            self.token = token;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the order failed with a reason.
    ///
    /// Idempotent for already-failed orders.
    ///
    /// # Errors
    ///
    /// Returns error if the order is COMPLETED (terminal reversal).
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ValidationError> {
        if self.status == OrderStatus::Failed {
            return Ok(());
        }
        self.status = self.status.transition_to(OrderStatus::Failed)?;
        self.last_error = Some(reason.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Returns true if the order has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    fn pending_order() -> Order {
        Order::create(test_user_id(), PlanTier::Premium, 800, "RON", false).unwrap()
    }

    // Construction tests

    #[test]
    fn create_starts_pending() {
        let order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.token.is_none());
        assert!(order.external_transaction_id.is_none());
        assert!(order.last_error.is_none());
    }

    #[test]
    fn create_rejects_negative_amount() {
        let result = Order::create(test_user_id(), PlanTier::Premium, -1, "RON", false);
        assert!(result.is_err());
    }

    #[test]
    fn create_accepts_zero_amount() {
        let order = Order::create(test_user_id(), PlanTier::Basic, 0, "RON", false).unwrap();
        assert_eq!(order.amount_minor, 0);
    }

    #[test]
    fn order_ids_are_unique_under_rapid_creation() {
        let a = pending_order();
        let b = pending_order();
        assert_ne!(a.order_id, b.order_id);
    }

    // Status transition tests

    #[test]
    fn pending_can_complete() {
        let mut order = pending_order();
        order.complete("tx-900", Some("tok_abc".to_string())).unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.external_transaction_id, Some("tx-900".to_string()));
        assert_eq!(order.token, Some("tok_abc".to_string()));
    }

    #[test]
    fn pending_can_fail() {
        let mut order = pending_order();
        order.fail("insufficient funds").unwrap();

        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.last_error, Some("insufficient funds".to_string()));
    }

    #[test]
    fn complete_is_idempotent() {
        let mut order = pending_order();
        order.complete("tx-900", None).unwrap();
        order.complete("tx-901", None).unwrap();

        // First completion wins; the retry is a no-op
        assert_eq!(order.external_transaction_id, Some("tx-900".to_string()));
    }

    #[test]
    fn fail_is_idempotent() {
        let mut order = pending_order();
        order.fail("declined").unwrap();
        order.fail("declined again").unwrap();

        assert_eq!(order.last_error, Some("declined".to_string()));
    }

    #[test]
    fn completed_cannot_fail() {
        let mut order = pending_order();
        order.complete("tx-900", None).unwrap();

        assert!(order.fail("late decline").is_err());
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn failed_cannot_complete() {
        let mut order = pending_order();
        order.fail("declined").unwrap();

        assert!(order.complete("tx-900", None).is_err());
        assert_eq!(order.status, OrderStatus::Failed);
    }

    #[test]
    fn complete_without_token_keeps_existing() {
        let mut order = pending_order();
        order.token = Some("tok_initial".to_string());
        order.complete("tx-900", None).unwrap();

        assert_eq!(order.token, Some("tok_initial".to_string()));
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }
}
