//! Ports - async trait interfaces between the application core and the
//! outside world.

mod billing_profile_repository;
mod notifier;
mod order_repository;
mod payment_gateway;
mod subscription_repository;

pub use billing_profile_repository::BillingProfileRepository;
pub use notifier::BillingNotifier;
pub use order_repository::{OrderRepository, TransitionOutcome};
pub use payment_gateway::{
    ChallengeOutcome, ChallengeVerification, GatewayError, GatewayErrorCode,
    HostedPaymentRedirect, HostedPaymentRequest, PaymentGateway, RecurringChargeOutcome,
    RecurringChargeRequest,
};
pub use subscription_repository::SubscriptionRepository;
