//! BillingNotifier port - user-facing billing notifications.
//!
//! Email delivery and in-app notification storage are external
//! collaborators; the billing core only enqueues through this port.
//! Implementations must tolerate being called at most once per order
//! outcome - the reconciler's idempotency guard guarantees it.

use async_trait::async_trait;

use crate::domain::billing::{Order, PlanTier};
use crate::domain::foundation::{DomainError, UserId};

/// Port for enqueueing user-facing billing notifications.
#[async_trait]
pub trait BillingNotifier: Send + Sync {
    /// A payment settled; the user's plan is (re)activated.
    async fn payment_succeeded(&self, user_id: &UserId, order: &Order) -> Result<(), DomainError>;

    /// A payment attempt failed.
    async fn payment_failed(
        &self,
        user_id: &UserId,
        order: &Order,
        reason: &str,
    ) -> Result<(), DomainError>;

    /// A subscription lapsed and the user's plan fell back.
    async fn subscription_expired(
        &self,
        user_id: &UserId,
        plan: PlanTier,
    ) -> Result<(), DomainError>;
}
