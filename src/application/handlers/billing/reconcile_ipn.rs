//! ReconcileIpnHandler - Command handler for gateway payment notifications.
//!
//! The reconciler is the single source of truth for order finality. The
//! synchronous gateway response is provisional; whatever the notification
//! says, applied exactly once, wins.
//!
//! ## Exactly-Once Semantics
//!
//! The idempotency guard is the order's conditional terminal transition:
//! only the caller that flips PENDING to a terminal status applies
//! downstream effects (subscription, plan mirror, notifications). Duplicate
//! deliveries and races observe an already-terminal row and acknowledge
//! without side effects. Terminal statuses are never reversed, so a
//! notification that contradicts an earlier terminal outcome is a logged
//! no-op.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingProfile, IpnNotification, Order, OrderStatus, Subscription,
    SubscriptionStatus,
};
use crate::ports::{
    BillingNotifier, BillingProfileRepository, OrderRepository, PaymentGateway,
    SubscriptionRepository,
};

/// Command to reconcile one raw notification payload.
#[derive(Debug, Clone)]
pub struct ReconcileIpnCommand {
    /// Raw envelope bytes as delivered by the gateway.
    pub payload: Vec<u8>,
}

/// Result of reconciling a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileIpnResult {
    /// First-time completion: order settled, subscription applied.
    Completed { order_id: String, user_id: String },

    /// First-time failure: order failed, subscription untouched.
    Failed { order_id: String, reason: String },

    /// The order was already terminal; nothing was applied.
    AlreadyReconciled { order_id: String },
}

/// Handler for processing gateway payment notifications.
pub struct ReconcileIpnHandler {
    orders: Arc<dyn OrderRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn BillingNotifier>,
}

impl ReconcileIpnHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            orders,
            subscriptions,
            profiles,
            gateway,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileIpnCommand,
    ) -> Result<ReconcileIpnResult, BillingError> {
        // 1. Verify and decode the envelope; failure means 400, no state change
        let notification = self
            .gateway
            .decode_notification(&cmd.payload)
            .map_err(|e| BillingError::invalid_notification(e.to_string()))?;

        // 2. Match the order
        let order = self
            .orders
            .find_by_order_id(&notification.order_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| BillingError::order_not_found(notification.order_id.clone()))?;

        // 3. The strict success rule decides the terminal status
        match notification.payment_status() {
            OrderStatus::Completed => self.apply_completed(order, &notification).await,
            _ => self.apply_failed(order, &notification).await,
        }
    }

    async fn apply_completed(
        &self,
        order: Order,
        notification: &IpnNotification,
    ) -> Result<ReconcileIpnResult, BillingError> {
        // Idempotency guard: a single conditional transition decides the winner
        let outcome = self
            .orders
            .complete(
                &order.order_id,
                &notification.external_transaction_id,
                notification.token.as_deref(),
            )
            .await
            .map_err(BillingError::from)?;

        if !outcome.first_transition() {
            tracing::info!(
                order_id = %order.order_id,
                ?outcome,
                "notification replay skipped; order already terminal"
            );
            return Ok(ReconcileIpnResult::AlreadyReconciled {
                order_id: order.order_id.to_string(),
            });
        }

        // Subscription: renew the current row when it matches the paid plan,
        // otherwise replace it (first purchase or upgrade resets the dates).
        let current = self
            .subscriptions
            .find_current_by_user(&order.user_id)
            .await
            .map_err(BillingError::from)?;

        match current {
            Some(mut sub)
                if sub.plan == order.plan && sub.status == SubscriptionStatus::Active =>
            {
                sub.renew()?;
                self.subscriptions
                    .update(&sub)
                    .await
                    .map_err(BillingError::from)?;
            }
            _ => {
                let sub = Subscription::activate(
                    order.user_id.clone(),
                    order.plan,
                    order.plan.price_minor(),
                    notification.currency.clone(),
                );
                self.subscriptions
                    .upsert_current(&sub)
                    .await
                    .map_err(BillingError::from)?;
            }
        }

        // Profile: plan mirror moves in the same operation, token persists
        let mut profile = self
            .profiles
            .find_by_user(&order.user_id)
            .await
            .map_err(BillingError::from)?
            .unwrap_or_else(|| BillingProfile::new(order.user_id.clone()));

        if let Some(token) = &notification.token {
            profile.store_token(token.clone(), notification.token_expiry);
        }
        if notification.recurring_setup {
            profile.auto_renew = true;
        }
        profile.set_plan_type(order.plan);
        self.profiles
            .upsert(&profile)
            .await
            .map_err(BillingError::from)?;

        // Notifications ride on the guard: at most once per order
        if let Err(e) = self.notifier.payment_succeeded(&order.user_id, &order).await {
            tracing::error!(order_id = %order.order_id, error = %e, "success notification failed");
        }

        tracing::info!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            plan = %order.plan,
            "order reconciled as completed"
        );

        Ok(ReconcileIpnResult::Completed {
            order_id: order.order_id.to_string(),
            user_id: order.user_id.to_string(),
        })
    }

    async fn apply_failed(
        &self,
        order: Order,
        notification: &IpnNotification,
    ) -> Result<ReconcileIpnResult, BillingError> {
        let reason = notification.failure_reason();

        let outcome = self
            .orders
            .fail(&order.order_id, &reason)
            .await
            .map_err(BillingError::from)?;

        if !outcome.first_transition() {
            tracing::info!(
                order_id = %order.order_id,
                ?outcome,
                "notification replay skipped; order already terminal"
            );
            return Ok(ReconcileIpnResult::AlreadyReconciled {
                order_id: order.order_id.to_string(),
            });
        }

        // A failed renewal must not revoke access early; the subscription
        // runs to its natural expiry untouched.
        if let Err(e) = self
            .notifier
            .payment_failed(&order.user_id, &order, &reason)
            .await
        {
            tracing::error!(order_id = %order.order_id, error = %e, "failure notification failed");
        }

        tracing::warn!(
            order_id = %order.order_id,
            user_id = %order.user_id,
            reason = %reason,
            "order reconciled as failed"
        );

        Ok(ReconcileIpnResult::Failed {
            order_id: order.order_id.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::{
        InMemoryBillingProfileRepository, InMemoryOrderRepository, InMemorySubscriptionRepository,
    };
    use crate::domain::billing::{PlanTier, SubscriptionStatus};
    use crate::domain::foundation::{DomainError, Timestamp, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Notifier
    // ════════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct CountingNotifier {
        succeeded: AtomicU32,
        failed: AtomicU32,
        #[allow(dead_code)]
        expired: AtomicU32,
    }

    #[async_trait]
    impl BillingNotifier for CountingNotifier {
        async fn payment_succeeded(
            &self,
            _user_id: &UserId,
            _order: &Order,
        ) -> Result<(), DomainError> {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn payment_failed(
            &self,
            _user_id: &UserId,
            _order: &Order,
            _reason: &str,
        ) -> Result<(), DomainError> {
            self.failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscription_expired(
            &self,
            _user_id: &UserId,
            _plan: PlanTier,
        ) -> Result<(), DomainError> {
            self.expired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixture
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        orders: Arc<InMemoryOrderRepository>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        profiles: Arc<InMemoryBillingProfileRepository>,
        gateway: Arc<MockPaymentGateway>,
        notifier: Arc<CountingNotifier>,
        handler: ReconcileIpnHandler,
    }

    fn fixture() -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let profiles = Arc::new(InMemoryBillingProfileRepository::new());
        let gateway = Arc::new(MockPaymentGateway::settling());
        let notifier = Arc::new(CountingNotifier::default());
        let handler = ReconcileIpnHandler::new(
            orders.clone(),
            subscriptions.clone(),
            profiles.clone(),
            gateway.clone(),
            notifier.clone(),
        );
        Fixture {
            orders,
            subscriptions,
            profiles,
            gateway,
            notifier,
            handler,
        }
    }

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    async fn pending_order(fx: &Fixture, plan: PlanTier) -> Order {
        let order =
            Order::create(test_user_id(), plan, plan.price_minor(), "RON", false).unwrap();
        fx.orders.save(&order).await.unwrap();
        order
    }

    fn success_notification(order: &Order) -> IpnNotification {
        IpnNotification {
            order_id: order.order_id.clone(),
            action: "confirmed".to_string(),
            error_code: 0,
            error_message: None,
            amount_minor: order.amount_minor,
            currency: "RON".to_string(),
            external_transaction_id: "tx-900".to_string(),
            masked_pan: Some("4111XXXXXXXX1111".to_string()),
            token: Some("tok_abc".to_string()),
            token_expiry: Some(Timestamp::now().add_days(365)),
            recurring_setup: true,
            timestamp: Timestamp::now(),
        }
    }

    fn failure_notification(order: &Order) -> IpnNotification {
        IpnNotification {
            error_code: 34,
            error_message: Some("insufficient funds".to_string()),
            action: "rejected".to_string(),
            token: None,
            token_expiry: None,
            recurring_setup: false,
            ..success_notification(order)
        }
    }

    fn sealed(fx: &Fixture, notification: &IpnNotification) -> ReconcileIpnCommand {
        ReconcileIpnCommand {
            payload: fx.gateway.seal_notification(notification),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Completion Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn completed_notification_settles_order_and_activates_subscription() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;

        let result = fx
            .handler
            .handle(sealed(&fx, &success_notification(&order)))
            .await
            .unwrap();

        assert!(matches!(result, ReconcileIpnResult::Completed { .. }));

        let stored = fx
            .orders
            .find_by_order_id(&order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.token, Some("tok_abc".to_string()));

        let sub = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.plan, PlanTier::Premium);
        assert_eq!(sub.status, SubscriptionStatus::Active);

        let profile = fx
            .profiles
            .find_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.plan_type, PlanTier::Premium);
        assert!(profile.has_usable_token(Timestamp::now()));
        assert!(profile.auto_renew);
    }

    #[tokio::test]
    async fn duplicate_notification_applies_effects_exactly_once() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;
        let notification = success_notification(&order);

        let first = fx.handler.handle(sealed(&fx, &notification)).await.unwrap();
        let sub_after_first = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();

        let second = fx.handler.handle(sealed(&fx, &notification)).await.unwrap();

        assert!(matches!(first, ReconcileIpnResult::Completed { .. }));
        assert!(matches!(
            second,
            ReconcileIpnResult::AlreadyReconciled { .. }
        ));

        // No double extension, exactly one success notification
        let sub_after_second = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub_after_first.end_date, sub_after_second.end_date);
        assert_eq!(fx.notifier.succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completion_renews_existing_subscription_on_same_plan() {
        let fx = fixture();
        let mut existing =
            Subscription::activate(test_user_id(), PlanTier::Premium, 800, "RON");
        existing.end_date = Timestamp::now().add_days(2);
        fx.subscriptions.upsert_current(&existing).await.unwrap();

        let order = pending_order(&fx, PlanTier::Premium).await;
        fx.handler
            .handle(sealed(&fx, &success_notification(&order)))
            .await
            .unwrap();

        let sub = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        // Same row renewed, not replaced
        assert_eq!(sub.id, existing.id);
        let days_left = sub.end_date.duration_since(&Timestamp::now()).num_days();
        assert!(days_left >= 29);
    }

    #[tokio::test]
    async fn completion_replaces_subscription_on_upgrade() {
        let fx = fixture();
        let existing = Subscription::activate(test_user_id(), PlanTier::Premium, 800, "RON");
        fx.subscriptions.upsert_current(&existing).await.unwrap();

        // Upgrade order carries the flat-difference amount
        let order = Order::create(test_user_id(), PlanTier::Gold, 2000, "RON", false).unwrap();
        fx.orders.save(&order).await.unwrap();

        fx.handler
            .handle(sealed(&fx, &success_notification(&order)))
            .await
            .unwrap();

        let sub = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.plan, PlanTier::Gold);
        // The recurring amount is the full plan price, not the upgrade delta
        assert_eq!(sub.amount_minor, PlanTier::Gold.price_minor());
        assert_ne!(sub.id, existing.id);

        let profile = fx
            .profiles
            .find_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.plan_type, PlanTier::Gold);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_notification_fails_order_and_leaves_subscription() {
        let fx = fixture();
        let existing = Subscription::activate(test_user_id(), PlanTier::Premium, 800, "RON");
        fx.subscriptions.upsert_current(&existing).await.unwrap();

        let order = pending_order(&fx, PlanTier::Premium).await;
        let result = fx
            .handler
            .handle(sealed(&fx, &failure_notification(&order)))
            .await
            .unwrap();

        assert!(matches!(result, ReconcileIpnResult::Failed { .. }));

        let stored = fx
            .orders
            .find_by_order_id(&order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);

        // Access persists until natural expiry
        let sub = fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.end_date, existing.end_date);
        assert_eq!(fx.notifier.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_action_with_nonzero_error_code_fails() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;

        let mut notification = success_notification(&order);
        notification.error_code = 99;

        let result = fx.handler.handle(sealed(&fx, &notification)).await.unwrap();

        assert!(matches!(result, ReconcileIpnResult::Failed { .. }));
        let stored = fx
            .orders
            .find_by_order_id(&order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn late_completion_after_local_failure_is_a_guarded_noop() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;
        fx.orders.fail(&order.order_id, "timeout").await.unwrap();

        let result = fx
            .handler
            .handle(sealed(&fx, &success_notification(&order)))
            .await
            .unwrap();

        assert!(matches!(
            result,
            ReconcileIpnResult::AlreadyReconciled { .. }
        ));
        // No terminal reversal, no side effects
        let stored = fx
            .orders
            .find_by_order_id(&order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert!(fx
            .subscriptions
            .find_current_by_user(&test_user_id())
            .await
            .unwrap()
            .is_none());
        assert_eq!(fx.notifier.succeeded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pending_order_with_recorded_error_still_completes_from_notification() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;
        fx.orders
            .record_pending_error(&order.order_id, "timeout: outcome uncertain")
            .await
            .unwrap();

        let result = fx
            .handler
            .handle(sealed(&fx, &success_notification(&order)))
            .await
            .unwrap();

        // The notification is authoritative for an order left open
        assert!(matches!(result, ReconcileIpnResult::Completed { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unverifiable_payload_is_rejected_without_state_change() {
        let fx = fixture();
        let order = pending_order(&fx, PlanTier::Premium).await;

        let result = fx
            .handler
            .handle(ReconcileIpnCommand {
                payload: b"garbage".to_vec(),
            })
            .await;

        assert!(matches!(
            result,
            Err(BillingError::InvalidNotification(_))
        ));
        let stored = fx
            .orders
            .find_by_order_id(&order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_order_is_reported_not_found() {
        let fx = fixture();
        let phantom =
            Order::create(test_user_id(), PlanTier::Premium, 800, "RON", false).unwrap();

        let result = fx
            .handler
            .handle(sealed(&fx, &success_notification(&phantom)))
            .await;

        assert!(matches!(result, Err(BillingError::OrderNotFound(_))));
    }
}
