//! Billing command and query handlers.

mod cancel_subscription;
mod expire_lapsed;
mod get_subscription;
mod reconcile_ipn;
mod run_renewals;
mod start_checkout;
mod verify_challenge;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use expire_lapsed::{ExpireLapsedHandler, ExpiryReport};
pub use get_subscription::{
    GetSubscriptionHandler, GetSubscriptionQuery, RepairOutcome, RepairSubscriptionHandler,
    SubscriptionView,
};
pub use reconcile_ipn::{ReconcileIpnCommand, ReconcileIpnHandler, ReconcileIpnResult};
pub use run_renewals::{RenewalPolicy, RenewalReport, RunRenewalsHandler};
pub use start_checkout::{
    CheckoutPolicy, StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult,
};
pub use verify_challenge::VerifyChallengeHandler;
