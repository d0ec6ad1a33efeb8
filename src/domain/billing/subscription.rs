//! Subscription aggregate entity.
//!
//! Each user has at most one current subscription (status active, or
//! cancelled but not yet past its end date). Expired rows are kept for
//! history.
//!
//! # Design Decisions
//!
//! - **One current per user**: Unique constraint on user_id for non-expired
//!   rows, enforced at the database level
//! - **Fixed billing period**: end date is always start + 30 days; no
//!   partial months
//! - **Renew from now**: renewal extends 30 days from the renewal instant,
//!   not from the old end date, so a late scheduler run cannot shorten the
//!   paid period

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, SubscriptionId, Timestamp, UserId, ValidationError};

use super::PlanTier;

/// Length of one billing period in days.
pub const BILLING_PERIOD_DAYS: i64 = 30;

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and auto-renewing.
    Active,

    /// Auto-renew disabled by the user. Access persists until end date.
    Cancelled,

    /// Past end date with no successful renewal. No access.
    Expired,
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From ACTIVE
            (Active, Active) // Renewal
                | (Active, Cancelled)
                | (Active, Expired)
            // From CANCELLED
                | (Cancelled, Expired)
            // From EXPIRED
                | (Expired, Active) // Grace-window renewal
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Active, Cancelled, Expired],
            Cancelled => vec![Expired],
            Expired => vec![Active],
        }
    }
}

/// Subscription aggregate - a user's current paid plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier for this subscription row.
    pub id: SubscriptionId,

    /// Owning user.
    pub user_id: UserId,

    /// Subscribed plan.
    pub plan: PlanTier,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Start of the current billing period.
    pub start_date: Timestamp,

    /// End of the current billing period.
    pub end_date: Timestamp,

    /// Amount charged per period, in minor currency units.
    pub amount_minor: i64,

    /// ISO currency code.
    pub currency: String,

    /// When the subscription row was created.
    pub created_at: Timestamp,

    /// When the subscription row was last updated.
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Activates a new subscription starting now.
    ///
    /// The end date is fixed at start + 30 days.
    pub fn activate(
        user_id: UserId,
        plan: PlanTier,
        amount_minor: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            user_id,
            plan,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: now.add_days(BILLING_PERIOD_DAYS),
            amount_minor,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this row is the user's current subscription:
    /// active, or cancelled but not yet past its end date.
    pub fn is_current(&self, now: Timestamp) -> bool {
        match self.status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Cancelled => self.end_date >= now,
            SubscriptionStatus::Expired => false,
        }
    }

    /// Renews the subscription for a new billing period.
    ///
    /// Extends 30 days from the renewal instant. Also used for grace-window
    /// renewals of subscriptions the scheduler already marked expired.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn renew(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(SubscriptionStatus::Active)?;
        let now = Timestamp::now();
        self.start_date = now;
        self.end_date = now.add_days(BILLING_PERIOD_DAYS);
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the subscription at period end.
    ///
    /// Disables auto-renew; the end date is untouched, so access persists
    /// until natural expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription is not active.
    pub fn cancel(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(SubscriptionStatus::Cancelled)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the subscription expired.
    ///
    /// # Errors
    ///
    /// Returns error if transition from current status is not allowed.
    pub fn expire(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(SubscriptionStatus::Expired)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Transitions to expired if the end date has passed.
    ///
    /// Returns true if the transition was applied.
    pub fn expire_if_past(&mut self, now: Timestamp) -> Result<bool, ValidationError> {
        if self.status == SubscriptionStatus::Expired || self.end_date >= now {
            return Ok(false);
        }
        self.expire()?;
        Ok(true)
    }
}
