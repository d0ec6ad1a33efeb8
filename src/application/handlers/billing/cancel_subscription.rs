//! CancelSubscriptionHandler - cancel-at-period-end.
//!
//! Cancellation disables auto-renew; access persists until the natural end
//! date. A second cancellation reports `NoActiveSubscription`, which the
//! caller treats as a non-fatal outcome.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PlanTier, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{BillingProfileRepository, SubscriptionRepository};

/// Command to cancel the acting user's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

/// Updated subscription state after cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSubscriptionResult {
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub end_date: Timestamp,
}

/// Handler for user-initiated cancellation.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
    ) -> Self {
        Self {
            subscriptions,
            profiles,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let mut sub = self
            .subscriptions
            .find_current_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| BillingError::no_active_subscription(cmd.user_id.clone()))?;

        // A cancelled-but-running row is "current" yet not cancellable again
        if sub.status != SubscriptionStatus::Active {
            return Err(BillingError::no_active_subscription(cmd.user_id.clone()));
        }

        sub.cancel()?;
        self.subscriptions
            .update(&sub)
            .await
            .map_err(BillingError::from)?;

        // Auto-renew flag moves with the cancellation
        if let Some(mut profile) = self
            .profiles
            .find_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?
        {
            profile.auto_renew = false;
            self.profiles
                .upsert(&profile)
                .await
                .map_err(BillingError::from)?;
        }

        tracing::info!(
            user_id = %cmd.user_id,
            plan = %sub.plan,
            end_date = %sub.end_date.as_datetime(),
            "subscription cancelled at period end"
        );

        Ok(CancelSubscriptionResult {
            plan: sub.plan,
            status: sub.status,
            end_date: sub.end_date,
        })
    }
}
