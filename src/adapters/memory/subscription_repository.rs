//! In-memory implementation of SubscriptionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

/// In-memory subscription store.
#[derive(Clone, Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, for assertions in tests.
    pub async fn all(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn upsert_current(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subs = self.subscriptions.write().await;
        // Replace any existing non-expired row for the user; expired rows
        // are history and stay.
        subs.retain(|_, s| {
            !(s.user_id == subscription.user_id && s.status != SubscriptionStatus::Expired)
        });
        subs.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subs = self.subscriptions.write().await;
        if !subs.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            ));
        }
        subs.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let subs = self.subscriptions.read().await;
        Ok(subs.get(id).cloned())
    }

    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let now = Timestamp::now();
        let subs = self.subscriptions.read().await;
        Ok(subs
            .values()
            .find(|s| &s.user_id == user_id && s.is_current(now))
            .cloned())
    }

    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        renew_ahead_days: i64,
        grace_days: i64,
    ) -> Result<Vec<Subscription>, DomainError> {
        let ahead_cutoff = now.add_days(renew_ahead_days);
        let grace_cutoff = now.minus_days(grace_days);
        let subs = self.subscriptions.read().await;

        Ok(subs
            .values()
            .filter(|s| match s.status {
                SubscriptionStatus::Active => s.end_date <= ahead_cutoff,
                SubscriptionStatus::Expired => {
                    s.end_date >= grace_cutoff && s.end_date <= now
                }
                SubscriptionStatus::Cancelled => false,
            })
            .cloned()
            .collect())
    }

    async fn find_lapsed(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError> {
        let subs = self.subscriptions.read().await;
        Ok(subs
            .values()
            .filter(|s| s.status != SubscriptionStatus::Expired && s.end_date < now)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PlanTier;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn subscription_for(id: &str, plan: PlanTier) -> Subscription {
        Subscription::activate(user(id), plan, plan.price_minor(), "RON")
    }

    #[tokio::test]
    async fn upsert_replaces_the_current_row_for_a_user() {
        let repo = InMemorySubscriptionRepository::new();
        let premium = subscription_for("u1", PlanTier::Premium);
        repo.upsert_current(&premium).await.unwrap();

        let gold = subscription_for("u1", PlanTier::Gold);
        repo.upsert_current(&gold).await.unwrap();

        let current = repo.find_current_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(current.plan, PlanTier::Gold);
        assert_eq!(repo.all().await.len(), 1);
    }

    #[tokio::test]
    async fn upsert_keeps_expired_history_rows() {
        let repo = InMemorySubscriptionRepository::new();
        let mut old = subscription_for("u1", PlanTier::Premium);
        old.expire().unwrap();
        repo.upsert_current(&old).await.unwrap();

        let fresh = subscription_for("u1", PlanTier::Gold);
        repo.upsert_current(&fresh).await.unwrap();

        assert_eq!(repo.all().await.len(), 2);
    }

    #[tokio::test]
    async fn find_current_skips_expired() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = subscription_for("u1", PlanTier::Premium);
        sub.expire().unwrap();
        repo.upsert_current(&sub).await.unwrap();

        assert!(repo.find_current_by_user(&user("u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_unknown_subscription_errors() {
        let repo = InMemorySubscriptionRepository::new();
        let sub = subscription_for("u1", PlanTier::Premium);
        assert!(repo.update(&sub).await.is_err());
    }

    #[tokio::test]
    async fn due_query_selects_active_inside_renew_ahead_window() {
        let repo = InMemorySubscriptionRepository::new();
        let mut due = subscription_for("u1", PlanTier::Premium);
        due.end_date = Timestamp::now().add_days(2);
        repo.upsert_current(&due).await.unwrap();

        let mut not_due = subscription_for("u2", PlanTier::Gold);
        not_due.end_date = Timestamp::now().add_days(20);
        repo.upsert_current(&not_due).await.unwrap();

        let candidates = repo
            .find_due_for_renewal(Timestamp::now(), 3, 3)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].user_id, user("u1"));
    }

    #[tokio::test]
    async fn due_query_includes_expired_within_grace_window() {
        let repo = InMemorySubscriptionRepository::new();
        let mut graced = subscription_for("u1", PlanTier::Premium);
        graced.end_date = Timestamp::now().minus_days(1);
        graced.expire().unwrap();
        repo.upsert_current(&graced).await.unwrap();

        let mut too_old = subscription_for("u2", PlanTier::Premium);
        too_old.end_date = Timestamp::now().minus_days(10);
        too_old.expire().unwrap();
        repo.upsert_current(&too_old).await.unwrap();

        let candidates = repo
            .find_due_for_renewal(Timestamp::now(), 3, 3)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].user_id, user("u1"));
    }

    #[tokio::test]
    async fn due_query_skips_cancelled() {
        let repo = InMemorySubscriptionRepository::new();
        let mut cancelled = subscription_for("u1", PlanTier::Premium);
        cancelled.end_date = Timestamp::now().add_days(1);
        cancelled.cancel().unwrap();
        repo.upsert_current(&cancelled).await.unwrap();

        let candidates = repo
            .find_due_for_renewal(Timestamp::now(), 3, 3)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn lapsed_query_selects_active_past_end_date() {
        let repo = InMemorySubscriptionRepository::new();
        let mut lapsed = subscription_for("u1", PlanTier::Premium);
        lapsed.end_date = Timestamp::now().minus_days(1);
        repo.upsert_current(&lapsed).await.unwrap();

        let fresh = subscription_for("u2", PlanTier::Gold);
        repo.upsert_current(&fresh).await.unwrap();

        let lapsed_rows = repo.find_lapsed(Timestamp::now()).await.unwrap();
        assert_eq!(lapsed_rows.len(), 1);
        assert_eq!(lapsed_rows[0].user_id, user("u1"));
    }
}
