//! ExpireLapsedHandler - the periodic expiry sweep.
//!
//! Catches subscriptions that ran past their end date without a renewal -
//! cancelled rows reaching their natural end, or active rows missed beyond
//! the grace window - marks them expired, and applies the plan fallback.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingNotifier, BillingProfileRepository, SubscriptionRepository};

/// Aggregate result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    /// Lapsed rows scanned.
    pub scanned: u32,

    /// Rows transitioned to expired.
    pub expired: u32,

    /// Plan mirrors rewritten to Basic (Bronze exempt).
    pub downgraded: u32,
}

/// Handler for the periodic expiry sweep.
pub struct ExpireLapsedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
    notifier: Arc<dyn BillingNotifier>,
}

impl ExpireLapsedHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            subscriptions,
            profiles,
            notifier,
        }
    }

    pub async fn handle(&self) -> Result<ExpiryReport, BillingError> {
        let now = Timestamp::now();
        let lapsed = self
            .subscriptions
            .find_lapsed(now)
            .await
            .map_err(BillingError::from)?;

        let mut report = ExpiryReport {
            scanned: lapsed.len() as u32,
            ..Default::default()
        };

        for mut sub in lapsed {
            if !sub.expire_if_past(now)? {
                continue;
            }
            self.subscriptions
                .update(&sub)
                .await
                .map_err(BillingError::from)?;
            report.expired += 1;

            if let Some(mut profile) = self
                .profiles
                .find_by_user(&sub.user_id)
                .await
                .map_err(BillingError::from)?
            {
                // Bronze retains its plan mirror on expiry
                if profile.downgrade_to_basic() {
                    self.profiles
                        .upsert(&profile)
                        .await
                        .map_err(BillingError::from)?;
                    report.downgraded += 1;
                }
            }

            if let Err(e) = self
                .notifier
                .subscription_expired(&sub.user_id, sub.plan)
                .await
            {
                tracing::error!(user_id = %sub.user_id, error = %e, "expiry notification failed");
            }

            tracing::info!(
                user_id = %sub.user_id,
                plan = %sub.plan,
                "subscription expired by sweep"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingProfileRepository, InMemorySubscriptionRepository,
    };
    use crate::domain::billing::{
        BillingProfile, Order, PlanTier, Subscription, SubscriptionStatus,
    };
    use crate::domain::foundation::{DomainError, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingNotifier {
        expired: AtomicU32,
    }

    #[async_trait]
    impl BillingNotifier for CountingNotifier {
        async fn payment_succeeded(
            &self,
            _user_id: &UserId,
            _order: &Order,
        ) -> Result<(), DomainError> {
            Ok(())
        }

        async fn payment_failed(
            &self,
            _user_id: &UserId,
            _order: &Order,
            _reason: &str,
        ) -> Result<(), DomainError> {
            Ok(())
        }

        async fn subscription_expired(
            &self,
            _user_id: &UserId,
            _plan: PlanTier,
        ) -> Result<(), DomainError> {
            self.expired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        profiles: Arc<InMemoryBillingProfileRepository>,
        notifier: Arc<CountingNotifier>,
        handler: ExpireLapsedHandler,
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let profiles = Arc::new(InMemoryBillingProfileRepository::new());
        let notifier = Arc::new(CountingNotifier {
            expired: AtomicU32::new(0),
        });
        let handler =
            ExpireLapsedHandler::new(subscriptions.clone(), profiles.clone(), notifier.clone());
        Fixture {
            subscriptions,
            profiles,
            notifier,
            handler,
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    async fn lapsed_subscription(fx: &Fixture, id: &str, plan: PlanTier) {
        let mut sub = Subscription::activate(user(id), plan, plan.price_minor(), "RON");
        sub.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.upsert_current(&sub).await.unwrap();

        let mut profile = BillingProfile::new(user(id));
        profile.set_plan_type(plan);
        fx.profiles.upsert(&profile).await.unwrap();
    }

    #[tokio::test]
    async fn lapsed_active_subscription_expires_and_downgrades() {
        let fx = fixture();
        lapsed_subscription(&fx, "u1", PlanTier::Premium).await;

        let report = fx.handler.handle().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.expired, 1);
        assert_eq!(report.downgraded, 1);

        let rows = fx.subscriptions.all().await;
        assert_eq!(rows[0].status, SubscriptionStatus::Expired);

        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Basic);
        assert_eq!(fx.notifier.expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bronze_keeps_plan_mirror_on_expiry() {
        let fx = fixture();
        lapsed_subscription(&fx, "u1", PlanTier::Bronze).await;

        let report = fx.handler.handle().await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.downgraded, 0);

        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Bronze);
    }

    #[tokio::test]
    async fn running_subscription_is_untouched() {
        let fx = fixture();
        let sub = Subscription::activate(user("u1"), PlanTier::Premium, 800, "RON");
        fx.subscriptions.upsert_current(&sub).await.unwrap();

        let report = fx.handler.handle().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(report.expired, 0);
        let rows = fx.subscriptions.all().await;
        assert_eq!(rows[0].status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let fx = fixture();
        lapsed_subscription(&fx, "u1", PlanTier::Premium).await;

        fx.handler.handle().await.unwrap();
        let second = fx.handler.handle().await.unwrap();

        assert_eq!(second.expired, 0);
        assert_eq!(fx.notifier.expired.load(Ordering::SeqCst), 1);
    }
}
