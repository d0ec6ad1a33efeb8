//! RunRenewalsHandler - the periodic renewal sweep.
//!
//! Invoked by an external time-based trigger. Scans subscriptions due
//! inside the renew-ahead window (plus recently expired ones inside the
//! grace window), drives token charges through the gateway, and applies
//! outcomes. The aggregate report is the scheduler's only externally
//! observable result.
//!
//! ## Outcome Classification
//!
//! - **No usable token**: the subscription lapses and the user's plan falls
//!   back to Basic (Bronze exempt) with no gateway call.
//! - **Definitive gateway decline**: order FAILED, plan falls back to Basic
//!   (Bronze exempt), reason recorded.
//! - **Indefinite failure** (timeout, unreachable): the order stays PENDING
//!   so the authoritative notification can still settle it; no fallback is
//!   applied, the attempt is only reported.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, BillingProfile, Order, Subscription, CURRENCY};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    BillingNotifier, BillingProfileRepository, OrderRepository, PaymentGateway,
    RecurringChargeRequest, SubscriptionRepository,
};

/// Scheduler windows and endpoints, injected from configuration.
#[derive(Debug, Clone)]
pub struct RenewalPolicy {
    /// Days before expiry at which renewal is attempted.
    pub renew_ahead_days: i64,

    /// Trailing days after expiry still eligible for renewal.
    pub grace_days: i64,

    /// Webhook URL passed to the gateway for confirmations.
    pub notify_url: String,
}

/// Aggregate result of one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    /// Candidates that passed the dueness guard.
    pub processed: u32,

    /// Successful renewals.
    pub successful: u32,

    /// Charge attempts that did not settle.
    pub failed: u32,

    /// Users whose plan fell back for lack of a usable token.
    pub downgraded: u32,

    /// Per-candidate error strings for operational tooling.
    pub errors: Vec<String>,
}

/// Handler for the periodic renewal sweep.
pub struct RunRenewalsHandler {
    orders: Arc<dyn OrderRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn BillingNotifier>,
    policy: RenewalPolicy,
}

impl RunRenewalsHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn BillingNotifier>,
        policy: RenewalPolicy,
    ) -> Self {
        Self {
            orders,
            subscriptions,
            profiles,
            gateway,
            notifier,
            policy,
        }
    }

    pub async fn handle(&self) -> Result<RenewalReport, BillingError> {
        let now = Timestamp::now();
        let candidates = self
            .subscriptions
            .find_due_for_renewal(now, self.policy.renew_ahead_days, self.policy.grace_days)
            .await
            .map_err(BillingError::from)?;

        tracing::info!(candidates = candidates.len(), "renewal sweep started");

        let mut report = RenewalReport::default();

        for candidate in candidates {
            // Re-read the row: an overlapping run may have renewed it since
            // selection. A candidate no longer due is skipped silently.
            let sub = match self
                .subscriptions
                .find_by_id(&candidate.id)
                .await
                .map_err(BillingError::from)?
            {
                Some(fresh) if self.is_due(&fresh, now) => fresh,
                _ => {
                    tracing::debug!(
                        subscription_id = %candidate.id,
                        "candidate no longer due; skipping"
                    );
                    continue;
                }
            };

            report.processed += 1;

            if let Err(e) = self.renew_one(sub, now, &mut report).await {
                // One bad candidate must not abort the sweep
                tracing::error!(error = %e, "renewal candidate processing failed");
                report.failed += 1;
                report.errors.push(e.to_string());
            }
        }

        tracing::info!(
            processed = report.processed,
            successful = report.successful,
            failed = report.failed,
            downgraded = report.downgraded,
            "renewal sweep finished"
        );

        Ok(report)
    }

    fn is_due(&self, sub: &Subscription, now: Timestamp) -> bool {
        use crate::domain::billing::SubscriptionStatus::*;
        match sub.status {
            Active => sub.end_date <= now.add_days(self.policy.renew_ahead_days),
            Expired => {
                sub.end_date >= now.minus_days(self.policy.grace_days) && sub.end_date <= now
            }
            Cancelled => false,
        }
    }

    async fn renew_one(
        &self,
        mut sub: Subscription,
        now: Timestamp,
        report: &mut RenewalReport,
    ) -> Result<(), BillingError> {
        let mut profile = self
            .profiles
            .find_by_user(&sub.user_id)
            .await
            .map_err(BillingError::from)?
            .unwrap_or_else(|| BillingProfile::new(sub.user_id.clone()));

        // Terminal without a charge: no usable token
        if !profile.has_usable_token(now) {
            self.lapse_without_charge(&mut sub, &mut profile, now, report)
                .await?;
            return Ok(());
        }

        let token = profile
            .recurring_token
            .clone()
            .expect("usable token implies presence");

        let order = Order::create(sub.user_id.clone(), sub.plan, sub.amount_minor, CURRENCY, true)?;
        self.orders.save(&order).await.map_err(BillingError::from)?;

        let request = RecurringChargeRequest {
            order_id: order.order_id.clone(),
            amount_minor: order.amount_minor,
            currency: order.currency.clone(),
            token,
            billing: profile.billing_address.clone(),
            notify_url: self.policy.notify_url.clone(),
        };

        match self.gateway.start_recurring_charge(request).await {
            Ok(outcome) if outcome.success => {
                let tx = outcome
                    .external_transaction_id
                    .as_deref()
                    .unwrap_or("unknown");
                self.orders
                    .complete(&order.order_id, tx, outcome.new_token.as_deref())
                    .await
                    .map_err(BillingError::from)?;

                sub.renew()?;
                self.subscriptions
                    .update(&sub)
                    .await
                    .map_err(BillingError::from)?;

                if let Some(new_token) = outcome.new_token {
                    profile.store_token(new_token, outcome.new_token_expiry);
                }
                profile.set_plan_type(sub.plan);
                self.profiles
                    .upsert(&profile)
                    .await
                    .map_err(BillingError::from)?;

                report.successful += 1;
                tracing::info!(
                    user_id = %sub.user_id,
                    order_id = %order.order_id,
                    plan = %sub.plan,
                    "subscription renewed"
                );
            }
            Ok(outcome) => {
                // The gateway answered: this decline is definitive
                let reason = outcome
                    .error
                    .unwrap_or_else(|| format!("gateway status '{}'", outcome.status));
                self.orders
                    .fail(&order.order_id, &reason)
                    .await
                    .map_err(BillingError::from)?;

                sub.expire_if_past(now)?;
                self.subscriptions
                    .update(&sub)
                    .await
                    .map_err(BillingError::from)?;
                if profile.downgrade_to_basic() {
                    self.profiles
                        .upsert(&profile)
                        .await
                        .map_err(BillingError::from)?;
                }

                if let Err(e) = self
                    .notifier
                    .payment_failed(&sub.user_id, &order, &reason)
                    .await
                {
                    tracing::error!(error = %e, "failure notification failed");
                }

                report.failed += 1;
                report
                    .errors
                    .push(format!("{}: charge failed: {}", sub.user_id, reason));
            }
            Err(e) if e.is_indefinite() => {
                // No definitive answer: leave the order open for the
                // authoritative notification; do not punish the user yet.
                let note = format!("charge outcome uncertain: {}", e);
                self.orders
                    .record_pending_error(&order.order_id, &note)
                    .await
                    .map_err(BillingError::from)?;

                report.failed += 1;
                report
                    .errors
                    .push(format!("{}: {}", sub.user_id, note));
                tracing::warn!(
                    order_id = %order.order_id,
                    error = %e,
                    "recurring charge indefinite; order left pending"
                );
            }
            Err(e) => {
                // Definitive transport-level rejection (bad credential etc.)
                self.orders
                    .fail(&order.order_id, &e.to_string())
                    .await
                    .map_err(BillingError::from)?;

                report.failed += 1;
                report
                    .errors
                    .push(format!("{}: gateway error: {}", sub.user_id, e));
            }
        }

        Ok(())
    }

    async fn lapse_without_charge(
        &self,
        sub: &mut Subscription,
        profile: &mut BillingProfile,
        now: Timestamp,
        report: &mut RenewalReport,
    ) -> Result<(), BillingError> {
        sub.expire_if_past(now)?;
        self.subscriptions
            .update(sub)
            .await
            .map_err(BillingError::from)?;

        if profile.downgrade_to_basic() {
            self.profiles
                .upsert(profile)
                .await
                .map_err(BillingError::from)?;
        }

        if let Err(e) = self
            .notifier
            .subscription_expired(&sub.user_id, sub.plan)
            .await
        {
            tracing::error!(error = %e, "expiry notification failed");
        }

        report.downgraded += 1;
        report
            .errors
            .push(format!("{}: downgraded: no token", sub.user_id));
        tracing::info!(
            user_id = %sub.user_id,
            plan = %sub.plan,
            "no usable token; downgraded without charge"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::{
        InMemoryBillingProfileRepository, InMemoryOrderRepository, InMemorySubscriptionRepository,
    };
    use crate::domain::billing::{OrderStatus, PlanTier, SubscriptionStatus};
    use crate::domain::foundation::{DomainError, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingNotifier {
        expired: AtomicU32,
        failed: AtomicU32,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                expired: AtomicU32::new(0),
                failed: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl BillingNotifier for CountingNotifier {
        async fn payment_succeeded(
            &self,
            _user_id: &UserId,
            _order: &Order,
        ) -> Result<(), DomainError> {
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

    struct Fixture {
        orders: Arc<InMemoryOrderRepository>,
        subscriptions: Arc<InMemorySubscriptionRepository>,
        profiles: Arc<InMemoryBillingProfileRepository>,
        gateway: Arc<MockPaymentGateway>,
        notifier: Arc<CountingNotifier>,
    }

    fn fixture(gateway: MockPaymentGateway) -> Fixture {
        Fixture {
            orders: Arc::new(InMemoryOrderRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            profiles: Arc::new(InMemoryBillingProfileRepository::new()),
            gateway: Arc::new(gateway),
            notifier: Arc::new(CountingNotifier::new()),
        }
    }

    fn handler(fx: &Fixture) -> RunRenewalsHandler {
        RunRenewalsHandler::new(
            fx.orders.clone(),
            fx.subscriptions.clone(),
            fx.profiles.clone(),
            fx.gateway.clone(),
            fx.notifier.clone(),
            RenewalPolicy {
                renew_ahead_days: 3,
                grace_days: 3,
                notify_url: "https://campushub.example/api/webhooks/payment".to_string(),
            },
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    async fn due_subscription(fx: &Fixture, id: &str, plan: PlanTier) -> Subscription {
        let mut sub = Subscription::activate(user(id), plan, plan.price_minor(), "RON");
        sub.end_date = Timestamp::now().add_days(1);
        fx.subscriptions.upsert_current(&sub).await.unwrap();
        sub
    }

    async fn profile_with_token(fx: &Fixture, id: &str, plan: PlanTier) {
        let mut profile = BillingProfile::new(user(id));
        profile.set_plan_type(plan);
        profile.store_token("tok_abc", Some(Timestamp::now().add_days(365)));
        profile.auto_renew = true;
        fx.profiles.upsert(&profile).await.unwrap();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Successful Renewal Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn due_subscription_with_token_is_renewed() {
        let fx = fixture(MockPaymentGateway::settling());
        due_subscription(&fx, "u1", PlanTier::Premium).await;
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.downgraded, 0);

        let sub = fx
            .subscriptions
            .find_current_by_user(&user("u1"))
            .await
            .unwrap()
            .unwrap();
        let days_left = sub.end_date.duration_since(&Timestamp::now()).num_days();
        assert!(days_left >= 29, "end date extends 30 days from now");

        // A COMPLETED order was recorded for the renewal
        let orders = fx.orders.all().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Completed);
        assert!(orders[0].is_recurring);
    }

    #[tokio::test]
    async fn expired_subscription_in_grace_window_is_renewed() {
        let fx = fixture(MockPaymentGateway::settling());
        let mut sub = Subscription::activate(user("u1"), PlanTier::Premium, 800, "RON");
        sub.end_date = Timestamp::now().minus_days(1);
        sub.expire().unwrap();
        fx.subscriptions.upsert_current(&sub).await.unwrap();
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.successful, 1);
        let renewed = fx
            .subscriptions
            .find_current_by_user(&user("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renewed.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn rolling_token_is_stored_on_success() {
        let fx = fixture(MockPaymentGateway::settling_with_token("tok_next"));
        due_subscription(&fx, "u1", PlanTier::Premium).await;
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        handler(&fx).handle().await.unwrap();

        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.recurring_token, Some("tok_next".to_string()));
    }

    #[tokio::test]
    async fn subscription_not_yet_due_is_not_touched() {
        let fx = fixture(MockPaymentGateway::settling());
        let mut sub = Subscription::activate(user("u1"), PlanTier::Premium, 800, "RON");
        sub.end_date = Timestamp::now().add_days(20);
        fx.subscriptions.upsert_current(&sub).await.unwrap();
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.processed, 0);
        assert!(fx.gateway.charge_requests().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // No-Token Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_token_downgrades_without_gateway_call() {
        let fx = fixture(MockPaymentGateway::settling());
        let mut sub = due_subscription(&fx, "u1", PlanTier::Premium).await;
        sub.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.update(&sub).await.unwrap();

        let mut profile = BillingProfile::new(user("u1"));
        profile.set_plan_type(PlanTier::Premium);
        fx.profiles.upsert(&profile).await.unwrap();

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.downgraded, 1);
        assert!(report.errors[0].contains("downgraded: no token"));
        assert!(fx.gateway.charge_requests().is_empty(), "no charge attempted");

        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Basic);
        assert_eq!(fx.notifier.expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_counts_as_missing() {
        let fx = fixture(MockPaymentGateway::settling());
        let mut sub = due_subscription(&fx, "u1", PlanTier::Premium).await;
        sub.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.update(&sub).await.unwrap();

        let mut profile = BillingProfile::new(user("u1"));
        profile.set_plan_type(PlanTier::Premium);
        profile.store_token("tok_stale", Some(Timestamp::now().minus_days(2)));
        fx.profiles.upsert(&profile).await.unwrap();

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.downgraded, 1);
        assert!(fx.gateway.charge_requests().is_empty());
    }

    #[tokio::test]
    async fn bronze_plan_is_not_downgraded_on_missing_token() {
        let fx = fixture(MockPaymentGateway::settling());
        let mut sub = due_subscription(&fx, "u1", PlanTier::Bronze).await;
        sub.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.update(&sub).await.unwrap();

        let mut profile = BillingProfile::new(user("u1"));
        profile.set_plan_type(PlanTier::Bronze);
        fx.profiles.upsert(&profile).await.unwrap();

        let report = handler(&fx).handle().await.unwrap();

        // Reported as downgraded, but the Bronze plan mirror is retained
        assert_eq!(report.downgraded, 1);
        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Bronze);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn declined_charge_fails_order_and_downgrades() {
        let fx = fixture(MockPaymentGateway::declining("insufficient funds"));
        let mut sub = due_subscription(&fx, "u1", PlanTier::Premium).await;
        sub.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.update(&sub).await.unwrap();
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("insufficient funds"));

        let orders = fx.orders.all().await;
        assert_eq!(orders[0].status, OrderStatus::Failed);

        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Basic);
        assert_eq!(fx.notifier.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_charge_leaves_order_pending_without_downgrade() {
        let fx = fixture(MockPaymentGateway::timing_out());
        due_subscription(&fx, "u1", PlanTier::Premium).await;
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("uncertain"));

        // Order stays open for the authoritative notification
        let orders = fx.orders.all().await;
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert!(orders[0].last_error.is_some());

        // No premature punishment
        let profile = fx.profiles.find_by_user(&user("u1")).await.unwrap().unwrap();
        assert_eq!(profile.plan_type, PlanTier::Premium);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Report Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn report_aggregates_mixed_outcomes() {
        let fx = fixture(MockPaymentGateway::settling());
        due_subscription(&fx, "u1", PlanTier::Premium).await;
        profile_with_token(&fx, "u1", PlanTier::Premium).await;

        let mut lapsed = due_subscription(&fx, "u2", PlanTier::Gold).await;
        lapsed.end_date = Timestamp::now().minus_days(1);
        fx.subscriptions.update(&lapsed).await.unwrap();
        let mut tokenless = BillingProfile::new(user("u2"));
        tokenless.set_plan_type(PlanTier::Gold);
        fx.profiles.upsert(&tokenless).await.unwrap();

        let report = handler(&fx).handle().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.successful, 1);
        assert_eq!(report.downgraded, 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn empty_candidate_set_yields_empty_report() {
        let fx = fixture(MockPaymentGateway::settling());
        let report = handler(&fx).handle().await.unwrap();
        assert_eq!(report, RenewalReport::default());
    }
}
