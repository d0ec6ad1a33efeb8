//! OrderRepository port - persistence for the payment attempt ledger.
//!
//! ## Why Terminal Transitions Are Conditional Updates
//!
//! The gateway retries undelivered notifications, the scheduler may overlap
//! with a webhook, and a user cancellation can race a renewal. Every
//! terminal status change is therefore expressed as a single atomic
//! compare-and-swap ("set COMPLETED where status is PENDING") rather than a
//! read-modify-write, so exactly one writer wins and duplicates observe a
//! terminal row.

use async_trait::async_trait;

use crate::domain::billing::{Order, OrderStatus};
use crate::domain::foundation::{DomainError, OrderId, UserId};

/// Result of a conditional terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This caller won the transition; downstream effects should run.
    Applied,

    /// The order was already in the requested terminal status.
    /// A successful no-op for notification retries.
    AlreadyInTarget,

    /// The order was already in the *other* terminal status. Effects must
    /// be skipped; terminal statuses are never reversed.
    AlreadyTerminal(OrderStatus),
}

impl TransitionOutcome {
    /// True when this caller should apply downstream effects.
    pub fn first_transition(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Port for storing and transitioning payment orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a freshly created PENDING order.
    async fn save(&self, order: &Order) -> Result<(), DomainError>;

    /// Finds an order by its external-facing id.
    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError>;

    /// Atomically completes a PENDING order.
    ///
    /// Persists the gateway transaction reference and, when provided, the
    /// charge token captured with the payment.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if no order with this id exists.
    async fn complete(
        &self,
        order_id: &OrderId,
        external_transaction_id: &str,
        token: Option<&str>,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Atomically fails a PENDING order, recording the reason.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if no order with this id exists.
    async fn fail(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Records a non-terminal error on a PENDING order.
    ///
    /// Used for failed-but-uncertain gateway calls where a later
    /// notification must still be able to complete the order.
    async fn record_pending_error(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), DomainError>;

    /// Most recent COMPLETED order for a user, optionally restricted to a
    /// trailing window in days.
    ///
    /// Used to reconcile a subscription that lags behind its most recent
    /// completed payment.
    async fn find_latest_completed_for_user(
        &self,
        user_id: &UserId,
        within_days: Option<i64>,
    ) -> Result<Option<Order>, DomainError>;
}
