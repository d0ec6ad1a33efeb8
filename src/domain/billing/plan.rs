//! Subscription plan catalog.
//!
//! The catalog is a fixed business table: plan names, monthly prices in
//! minor currency units (bani), feature lists, and a total hierarchy order
//! used for upgrade/downgrade decisions.
//!
//! # Design Decisions
//!
//! - **Money in minor units**: All monetary values are i64 bani (not floats)
//! - **Rank is not price**: Basic is priced 0 yet ranks above Bronze. This
//!   is an intentional business choice (Bronze is a legacy paid tier kept
//!   below the free default), not a bug.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Billing currency used across the platform.
pub const CURRENCY: &str = "RON";

/// Subscription plan tier.
///
/// Determines feature access and pricing. Ordered by hierarchy rank:
/// Bronze < Basic < Premium < Gold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Legacy paid entry tier. Ranked below Basic despite being priced.
    Bronze,

    /// Free default tier. Users land here after expiry or downgrade.
    Basic,

    /// Standard paid tier.
    Premium,

    /// Top paid tier.
    Gold,
}

/// Catalog row for a single plan.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub tier: PlanTier,
    pub price_minor: i64,
    pub features: &'static [&'static str],
}

/// The immutable plan catalog, in rank order.
static CATALOG: Lazy<Vec<PlanSpec>> = Lazy::new(|| {
    vec![
        PlanSpec {
            tier: PlanTier::Bronze,
            price_minor: 400,
            features: &["project hosting", "forum access"],
        },
        PlanSpec {
            tier: PlanTier::Basic,
            price_minor: 0,
            features: &["forum access"],
        },
        PlanSpec {
            tier: PlanTier::Premium,
            price_minor: 800,
            features: &["project hosting", "forum access", "featured listings"],
        },
        PlanSpec {
            tier: PlanTier::Gold,
            price_minor: 2800,
            features: &[
                "project hosting",
                "forum access",
                "featured listings",
                "priority support",
                "team pages",
            ],
        },
    ]
});

impl PlanTier {
    /// All tiers in rank order.
    pub fn all() -> [PlanTier; 4] {
        [
            PlanTier::Bronze,
            PlanTier::Basic,
            PlanTier::Premium,
            PlanTier::Gold,
        ]
    }

    /// Returns the catalog row for this tier.
    pub fn spec(&self) -> &'static PlanSpec {
        CATALOG
            .iter()
            .find(|s| s.tier == *self)
            .expect("catalog covers every tier")
    }

    /// Monthly price in minor currency units (bani).
    pub fn price_minor(&self) -> i64 {
        self.spec().price_minor
    }

    /// Ordered feature list for this tier.
    pub fn features(&self) -> &'static [&'static str] {
        self.spec().features
    }

    /// Returns the numeric hierarchy rank of this tier.
    ///
    /// Higher rank = higher tier. Used for upgrade validation. Note that
    /// rank does not follow price: Basic (0 RON) outranks Bronze (4 RON).
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Bronze => 0,
            PlanTier::Basic => 1,
            PlanTier::Premium => 2,
            PlanTier::Gold => 3,
        }
    }

    /// Returns true if moving from `from` to `to` is an upgrade.
    pub fn is_upgrade(from: PlanTier, to: PlanTier) -> bool {
        to.rank() > from.rank()
    }

    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        self.price_minor() > 0
    }

    /// Whether a lapsed subscription on this tier falls back to Basic.
    ///
    /// Bronze users are deliberately not rewritten to Basic when their
    /// subscription expires. Business rule inherited from the legacy
    /// free-tier-equivalent handling of Bronze; confirm with product
    /// before removing.
    pub fn downgrades_on_expiry(&self) -> bool {
        !matches!(self, PlanTier::Bronze)
    }

    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Bronze => "Bronze",
            PlanTier::Basic => "Basic",
            PlanTier::Premium => "Premium",
            PlanTier::Gold => "Gold",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for PlanTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bronze" => Ok(PlanTier::Bronze),
            "basic" => Ok(PlanTier::Basic),
            "premium" => Ok(PlanTier::Premium),
            "gold" => Ok(PlanTier::Gold),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan name: {}", other),
            )),
        }
    }
}
