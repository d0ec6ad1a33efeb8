//! SubscriptionRepository port - persistence for the one-current-per-user
//! subscription store.

use async_trait::async_trait;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp, UserId};

/// Port for storing and querying subscriptions.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Upserts the user's current subscription row.
    ///
    /// Replaces any existing non-expired row for the user; expired rows are
    /// retained for history.
    async fn upsert_current(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Updates an existing subscription row in place.
    ///
    /// # Errors
    ///
    /// `SubscriptionNotFound` if the row does not exist.
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Finds a subscription by row id.
    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// The user's current subscription: active, or cancelled but not yet
    /// past its end date. Expired rows are never returned.
    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Renewal candidates at `now`:
    /// active subscriptions ending within `renew_ahead_days`, plus expired
    /// subscriptions whose end date falls within the trailing `grace_days`.
    ///
    /// Selection doubles as the idempotency guard for serialized scheduler
    /// runs: a subscription already renewed past the window is not due.
    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        renew_ahead_days: i64,
        grace_days: i64,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Non-expired subscriptions whose end date has passed at `now`:
    /// lapsed active rows and cancelled rows reaching their natural end.
    ///
    /// Fed to the expiry sweep.
    async fn find_lapsed(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError>;
}
