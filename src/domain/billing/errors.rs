//! Billing-specific error types.
//!
//! Errors related to checkout, order reconciliation, and subscription
//! lifecycle operations.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | OrderNotFound | 404 |
//! | NoActiveSubscription | 409 |
//! | InvalidPlan | 400 |
//! | MissingBillingField | 400 |
//! | DowngradeNotAllowed | 409 |
//! | AlreadyOnPlan | 409 |
//! | PaymentFailed | 402 |
//! | InvalidState | 409 |
//! | InvalidNotification | 400 |
//! | Unauthorized | 401 |
//! | ValidationFailed | 400 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId};

use super::PlanTier;

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// No order matches the given external id.
    OrderNotFound(OrderId),

    /// The user has no active subscription to operate on.
    NoActiveSubscription(UserId),

    /// Unknown plan name at the boundary.
    InvalidPlan(String),

    /// A required billing field is absent.
    MissingBillingField(String),

    /// Purchase of a lower-ranked plan while a subscription is current.
    DowngradeNotAllowed {
        current: PlanTier,
        requested: PlanTier,
    },

    /// Purchase of the plan the user already holds.
    AlreadyOnPlan(PlanTier),

    /// The gateway reported a payment failure.
    PaymentFailed { reason: String },

    /// Invalid state for the requested operation.
    InvalidState { current: String, attempted: String },

    /// Notification payload could not be verified or decoded.
    InvalidNotification(String),

    /// Caller lacks the required credential.
    Unauthorized,

    /// Validation failed.
    ValidationFailed { field: String, message: String },

    /// Infrastructure error.
    Infrastructure(String),
}

impl BillingError {
    // Constructor functions for cleaner error creation

    pub fn order_not_found(order_id: OrderId) -> Self {
        BillingError::OrderNotFound(order_id)
    }

    pub fn no_active_subscription(user_id: UserId) -> Self {
        BillingError::NoActiveSubscription(user_id)
    }

    pub fn invalid_plan(plan: impl Into<String>) -> Self {
        BillingError::InvalidPlan(plan.into())
    }

    pub fn missing_billing_field(field: impl Into<String>) -> Self {
        BillingError::MissingBillingField(field.into())
    }

    pub fn downgrade_not_allowed(current: PlanTier, requested: PlanTier) -> Self {
        BillingError::DowngradeNotAllowed { current, requested }
    }

    pub fn already_on_plan(plan: PlanTier) -> Self {
        BillingError::AlreadyOnPlan(plan)
    }

    pub fn payment_failed(reason: impl Into<String>) -> Self {
        BillingError::PaymentFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn invalid_notification(reason: impl Into<String>) -> Self {
        BillingError::InvalidNotification(reason.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            BillingError::NoActiveSubscription(_) => ErrorCode::NoActiveSubscription,
            BillingError::InvalidPlan(_) => ErrorCode::InvalidPlan,
            BillingError::MissingBillingField(_) => ErrorCode::EmptyField,
            BillingError::DowngradeNotAllowed { .. } => ErrorCode::DowngradeNotAllowed,
            BillingError::AlreadyOnPlan(_) => ErrorCode::AlreadyOnPlan,
            BillingError::PaymentFailed { .. } => ErrorCode::PaymentFailed,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::InvalidNotification(_) => ErrorCode::InvalidNotification,
            BillingError::Unauthorized => ErrorCode::Unauthorized,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::OrderNotFound(id) => format!("Order not found: {}", id),
            BillingError::NoActiveSubscription(user_id) => {
                format!("No active subscription for user: {}", user_id)
            }
            BillingError::InvalidPlan(plan) => format!("Invalid plan: {}", plan),
            BillingError::MissingBillingField(field) => {
                format!("Missing billing field: {}", field)
            }
            BillingError::DowngradeNotAllowed { current, requested } => {
                format!(
                    "Cannot move from {} to {} while the subscription is active",
                    current, requested
                )
            }
            BillingError::AlreadyOnPlan(plan) => {
                format!("Already subscribed to the {} plan", plan)
            }
            BillingError::PaymentFailed { reason } => format!("Payment failed: {}", reason),
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} a subscription in {} state", attempted, current)
            }
            BillingError::InvalidNotification(reason) => {
                format!("Invalid payment notification: {}", reason)
            }
            BillingError::Unauthorized => "Unauthorized".to_string(),
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Infrastructure(_) | BillingError::PaymentFailed { .. }
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => BillingError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::InvalidStateTransition => BillingError::InvalidState {
                current: "unknown".to_string(),
                attempted: err.message,
            },
            ErrorCode::PaymentFailed => BillingError::PaymentFailed {
                reason: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}

impl From<crate::domain::foundation::ValidationError> for BillingError {
    fn from(err: crate::domain::foundation::ValidationError) -> Self {
        BillingError::ValidationFailed {
            field: "unknown".to_string(),
            message: err.to_string(),
        }
    }
}
