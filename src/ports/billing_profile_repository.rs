//! BillingProfileRepository port - persistence for the billing-relevant
//! subset of User.

use async_trait::async_trait;

use crate::domain::billing::BillingProfile;
use crate::domain::foundation::{DomainError, UserId};

/// Port for storing billing profiles.
#[async_trait]
pub trait BillingProfileRepository: Send + Sync {
    /// Finds the billing profile for a user.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<BillingProfile>, DomainError>;

    /// Inserts or replaces the user's billing profile.
    async fn upsert(&self, profile: &BillingProfile) -> Result<(), DomainError>;
}
