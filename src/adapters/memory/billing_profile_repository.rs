//! In-memory implementation of BillingProfileRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::BillingProfile;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::BillingProfileRepository;

/// In-memory billing profile store.
#[derive(Clone, Default)]
pub struct InMemoryBillingProfileRepository {
    profiles: Arc<RwLock<HashMap<UserId, BillingProfile>>>,
}

impl InMemoryBillingProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingProfileRepository for InMemoryBillingProfileRepository {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<BillingProfile>, DomainError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).cloned())
    }

    async fn upsert(&self, profile: &BillingProfile) -> Result<(), DomainError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PlanTier;

    #[tokio::test]
    async fn upsert_then_find_roundtrips() {
        let repo = InMemoryBillingProfileRepository::new();
        let user = UserId::new("u1").unwrap();
        let mut profile = BillingProfile::new(user.clone());
        profile.set_plan_type(PlanTier::Gold);

        repo.upsert(&profile).await.unwrap();

        let found = repo.find_by_user(&user).await.unwrap().unwrap();
        assert_eq!(found.plan_type, PlanTier::Gold);
    }

    #[tokio::test]
    async fn find_returns_none_for_unknown_user() {
        let repo = InMemoryBillingProfileRepository::new();
        let user = UserId::new("missing").unwrap();
        assert!(repo.find_by_user(&user).await.unwrap().is_none());
    }
}
