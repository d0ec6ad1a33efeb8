//! Structured-log notifier adapter.
//!
//! Email delivery and in-app notification storage live in external
//! services; this adapter emits the billing events as structured tracing
//! records that the notification pipeline consumes downstream.

use async_trait::async_trait;

use crate::domain::billing::{Order, PlanTier};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::BillingNotifier;

/// Notifier that records billing events as structured logs.
#[derive(Clone, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BillingNotifier for TracingNotifier {
    async fn payment_succeeded(&self, user_id: &UserId, order: &Order) -> Result<(), DomainError> {
        tracing::info!(
            user_id = %user_id,
            order_id = %order.order_id,
            plan = %order.plan,
            amount_minor = order.amount_minor,
            "billing notification: payment succeeded"
        );
        Ok(())
    }

    async fn payment_failed(
        &self,
        user_id: &UserId,
        order: &Order,
        reason: &str,
    ) -> Result<(), DomainError> {
        tracing::warn!(
            user_id = %user_id,
            order_id = %order.order_id,
            plan = %order.plan,
            reason = reason,
            "billing notification: payment failed"
        );
        Ok(())
    }

    async fn subscription_expired(
        &self,
        user_id: &UserId,
        plan: PlanTier,
    ) -> Result<(), DomainError> {
        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            "billing notification: subscription expired"
        );
        Ok(())
    }
}
