//! GetSubscriptionHandler - read side of the subscription store, plus the
//! repair path for a subscription lagging its most recent completed order.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, BillingProfile, PlanTier, Subscription, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{BillingProfileRepository, OrderRepository, SubscriptionRepository};

/// Window in which a completed order can still seed a repair.
///
/// One billing period plus the grace days: anything older describes a
/// subscription that has legitimately run out.
const REPAIR_WINDOW_DAYS: i64 = 33;

/// Query for the acting user's subscription view.
#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

/// Read model of the current subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub amount_minor: i64,
    pub currency: String,
}

impl From<&Subscription> for SubscriptionView {
    fn from(sub: &Subscription) -> Self {
        Self {
            plan: sub.plan,
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
            amount_minor: sub.amount_minor,
            currency: sub.currency.clone(),
        }
    }
}

/// Handler for subscription reads.
pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<Option<SubscriptionView>, BillingError> {
        let sub = self
            .subscriptions
            .find_current_by_user(&query.user_id)
            .await
            .map_err(BillingError::from)?;
        Ok(sub.as_ref().map(SubscriptionView::from))
    }
}

/// Outcome of a repair pass for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Subscription re-derived from the latest completed order.
    Repaired { plan: PlanTier },

    /// Subscription already reflects the latest completed order.
    InSync,

    /// No recent completed order to reconcile against.
    NothingToRepair,
}

/// Handler that reconciles a subscription lagging behind its most recent
/// completed order (a notification applied the order but a later write
/// failed, or the rows diverged during an incident).
pub struct RepairSubscriptionHandler {
    orders: Arc<dyn OrderRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
}

impl RepairSubscriptionHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
    ) -> Self {
        Self {
            orders,
            subscriptions,
            profiles,
        }
    }

    pub async fn handle(&self, user_id: &UserId) -> Result<RepairOutcome, BillingError> {
        let latest = self
            .orders
            .find_latest_completed_for_user(user_id, Some(REPAIR_WINDOW_DAYS))
            .await
            .map_err(BillingError::from)?;

        let Some(order) = latest else {
            return Ok(RepairOutcome::NothingToRepair);
        };

        let current = self
            .subscriptions
            .find_current_by_user(user_id)
            .await
            .map_err(BillingError::from)?;

        if let Some(sub) = &current {
            if sub.plan == order.plan {
                return Ok(RepairOutcome::InSync);
            }
        }

        // The ledger says the user paid for a plan the store does not show:
        // re-derive the subscription from the order.
        let sub = Subscription::activate(
            user_id.clone(),
            order.plan,
            order.plan.price_minor(),
            order.currency.clone(),
        );
        self.subscriptions
            .upsert_current(&sub)
            .await
            .map_err(BillingError::from)?;

        let mut profile = self
            .profiles
            .find_by_user(user_id)
            .await
            .map_err(BillingError::from)?
            .unwrap_or_else(|| BillingProfile::new(user_id.clone()));
        profile.set_plan_type(order.plan);
        self.profiles
            .upsert(&profile)
            .await
            .map_err(BillingError::from)?;

        tracing::warn!(
            user_id = %user_id,
            order_id = %order.order_id,
            plan = %order.plan,
            "subscription repaired from completed order"
        );

        Ok(RepairOutcome::Repaired { plan: order.plan })
    }
}
