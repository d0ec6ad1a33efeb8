//! Pro-rata pricing engine.
//!
//! Pure decision function for what a purchase of `new_plan` costs given the
//! user's current subscription. Upgrades while a subscription is current are
//! charged the flat price difference between the plans; the time-prorated
//! variant was considered and superseded by this simpler policy.

use crate::domain::foundation::Timestamp;

use super::{BillingError, PlanTier, Subscription};

/// How the quoted amount was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    /// No current subscription: full plan price.
    NewPurchase,

    /// Mid-cycle upgrade: price difference over the current plan.
    Upgrade { from: PlanTier },
}

/// A priced purchase decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    /// Amount to charge, in minor currency units, already clamped to the
    /// configured minimum.
    pub amount_minor: i64,

    /// Derivation of the amount.
    pub kind: QuoteKind,
}

/// Quotes the amount owed for purchasing `new_plan`.
///
/// Rules:
/// - a current subscription on a higher-ranked plan rejects the purchase
///   (`DowngradeNotAllowed`)
/// - a current subscription on the same plan rejects it (`AlreadyOnPlan`)
/// - an upgrade over a current subscription charges
///   `price(new) - price(current)`
/// - with no current subscription (first purchase or lapsed) the full plan
///   price is charged
/// - every computed amount is clamped to `min_charge_minor` so sub-unit
///   amounts never reach the gateway
///
/// # Errors
///
/// `DowngradeNotAllowed` or `AlreadyOnPlan` as above; no other failure mode.
pub fn quote_purchase(
    current: Option<&Subscription>,
    new_plan: PlanTier,
    min_charge_minor: i64,
    now: Timestamp,
) -> Result<PriceQuote, BillingError> {
    let current = current.filter(|sub| sub.is_current(now));

    let quote = match current {
        Some(sub) => {
            if new_plan.rank() < sub.plan.rank() {
                return Err(BillingError::downgrade_not_allowed(sub.plan, new_plan));
            }
            if new_plan.rank() == sub.plan.rank() {
                return Err(BillingError::already_on_plan(sub.plan));
            }
            PriceQuote {
                amount_minor: new_plan.price_minor() - sub.plan.price_minor(),
                kind: QuoteKind::Upgrade { from: sub.plan },
            }
        }
        None => PriceQuote {
            amount_minor: new_plan.price_minor(),
            kind: QuoteKind::NewPurchase,
        },
    };

    Ok(PriceQuote {
        amount_minor: quote.amount_minor.max(min_charge_minor),
        kind: quote.kind,
    })
}
