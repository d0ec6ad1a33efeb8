//! Billing-relevant subset of the platform User.
//!
//! `plan_type` is a derived cache of the current subscription's plan. Every
//! state-transition path (checkout completion, IPN reconciliation, renewal,
//! expiry) must update it in the same operation as the subscription - it is
//! never an independent source of truth.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::PlanTier;

/// Billing address collected at checkout.
///
/// All fields are plain optional-with-default strings, validated once at
/// the checkout boundary rather than re-checked at each call site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

impl BillingAddress {
    /// Returns the first required field that is missing, if any.
    ///
    /// Name, email, and address fields are required by the gateway; phone,
    /// city, and country are optional.
    pub fn missing_required_field(&self) -> Option<&'static str> {
        if self.first_name.trim().is_empty() {
            return Some("first_name");
        }
        if self.last_name.trim().is_empty() {
            return Some("last_name");
        }
        if self.email.trim().is_empty() {
            return Some("email");
        }
        if self.address.trim().is_empty() {
            return Some("address");
        }
        None
    }
}

/// Billing profile - the payment-relevant fields of a User.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    /// Owning user.
    pub user_id: UserId,

    /// Mirror of the current subscription's plan.
    pub plan_type: PlanTier,

    /// Gateway-issued token for off-session recurring charges.
    pub recurring_token: Option<String>,

    /// Expiry of the recurring token, if the gateway reported one.
    pub token_expiry: Option<Timestamp>,

    /// Whether scheduled renewals should be attempted.
    pub auto_renew: bool,

    /// Billing address captured at last checkout.
    pub billing_address: BillingAddress,

    /// When the profile was last updated.
    pub updated_at: Timestamp,
}

impl BillingProfile {
    /// Creates a profile on the free default plan with no token.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            plan_type: PlanTier::Basic,
            recurring_token: None,
            token_expiry: None,
            auto_renew: false,
            billing_address: BillingAddress::default(),
            updated_at: Timestamp::now(),
        }
    }

    /// Returns true if the stored token can be charged at `now`.
    ///
    /// A token is usable when present and either non-expiring or not yet
    /// past its expiry.
    pub fn has_usable_token(&self, now: Timestamp) -> bool {
        match (&self.recurring_token, &self.token_expiry) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(expiry)) => *expiry >= now,
        }
    }

    /// Stores a rolling token issued by the gateway.
    pub fn store_token(&mut self, token: impl Into<String>, expiry: Option<Timestamp>) {
        self.recurring_token = Some(token.into());
        self.token_expiry = expiry;
        self.updated_at = Timestamp::now();
    }

    /// Mirrors the current subscription's plan onto the profile.
    pub fn set_plan_type(&mut self, plan: PlanTier) {
        self.plan_type = plan;
        self.updated_at = Timestamp::now();
    }

    /// Applies the expiry fallback: rewrite plan_type to Basic unless the
    /// current plan is exempt (Bronze).
    ///
    /// Returns true if the plan was rewritten.
    pub fn downgrade_to_basic(&mut self) -> bool {
        if !self.plan_type.downgrades_on_expiry() {
            return false;
        }
        if self.plan_type == PlanTier::Basic {
            return false;
        }
        self.set_plan_type(PlanTier::Basic);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    fn profile() -> BillingProfile {
        BillingProfile::new(test_user_id())
    }

    // Token tests

    #[test]
    fn new_profile_has_no_usable_token() {
        assert!(!profile().has_usable_token(Timestamp::now()));
    }

    #[test]
    fn stored_token_without_expiry_is_usable() {
        let mut p = profile();
        p.store_token("tok_abc", None);
        assert!(p.has_usable_token(Timestamp::now()));
    }

    #[test]
    fn stored_token_before_expiry_is_usable() {
        let mut p = profile();
        p.store_token("tok_abc", Some(Timestamp::now().add_days(365)));
        assert!(p.has_usable_token(Timestamp::now()));
    }

    #[test]
    fn expired_token_is_not_usable() {
        let mut p = profile();
        p.store_token("tok_abc", Some(Timestamp::now().minus_days(1)));
        assert!(!p.has_usable_token(Timestamp::now()));
    }

    // Plan mirror tests

    #[test]
    fn new_profile_defaults_to_basic() {
        assert_eq!(profile().plan_type, PlanTier::Basic);
    }

    #[test]
    fn downgrade_rewrites_paid_plans_to_basic() {
        let mut p = profile();
        p.set_plan_type(PlanTier::Gold);

        assert!(p.downgrade_to_basic());
        assert_eq!(p.plan_type, PlanTier::Basic);
    }

    #[test]
    fn downgrade_leaves_bronze_untouched() {
        let mut p = profile();
        p.set_plan_type(PlanTier::Bronze);

        assert!(!p.downgrade_to_basic());
        assert_eq!(p.plan_type, PlanTier::Bronze);
    }

    #[test]
    fn downgrade_is_noop_on_basic() {
        let mut p = profile();
        assert!(!p.downgrade_to_basic());
        assert_eq!(p.plan_type, PlanTier::Basic);
    }

    // Address validation tests

    #[test]
    fn default_address_is_missing_first_name() {
        let addr = BillingAddress::default();
        assert_eq!(addr.missing_required_field(), Some("first_name"));
    }

    #[test]
    fn complete_address_has_no_missing_fields() {
        let addr = BillingAddress {
            first_name: "Ana".to_string(),
            last_name: "Popescu".to_string(),
            email: "ana@example.com".to_string(),
            address: "Str. Universitatii 1".to_string(),
            ..Default::default()
        };
        assert_eq!(addr.missing_required_field(), None);
    }

    #[test]
    fn whitespace_only_fields_count_as_missing() {
        let addr = BillingAddress {
            first_name: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(addr.missing_required_field(), Some("first_name"));
    }
}
