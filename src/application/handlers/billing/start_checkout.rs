//! StartCheckoutHandler - Command handler for user-initiated purchases.
//!
//! Validates the request at the boundary, consults the pricing engine,
//! creates a PENDING order, and asks the gateway for a hosted-payment
//! redirect descriptor. No state beyond the order and the stored billing
//! address changes until the gateway notifies.

use std::sync::Arc;

use crate::domain::billing::{
    quote_purchase, BillingAddress, BillingError, BillingProfile, Order, PlanTier, QuoteKind,
    CURRENCY,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    BillingProfileRepository, HostedPaymentRedirect, HostedPaymentRequest, OrderRepository,
    PaymentGateway, SubscriptionRepository,
};

/// Checkout endpoints and pricing floor, injected from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutPolicy {
    /// Smallest amount ever sent to the gateway, in minor units.
    pub min_charge_minor: i64,

    /// Webhook URL the gateway notifies asynchronously.
    pub notify_url: String,

    /// URL the end user returns to after the hosted flow.
    pub return_url: String,
}

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    /// Acting user.
    pub user_id: UserId,

    /// Requested plan name, validated here.
    pub plan: String,

    /// Billing details from the checkout form.
    pub billing: BillingAddress,
}

/// Result of starting a checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutResult {
    /// Created order id.
    pub order_id: String,

    /// Amount that will be charged, in minor units.
    pub amount_minor: i64,

    /// Plan being purchased.
    pub plan: PlanTier,

    /// Redirect descriptor for the hosted payment page.
    pub redirect: HostedPaymentRedirect,
}

/// Handler for user-initiated checkout.
pub struct StartCheckoutHandler {
    orders: Arc<dyn OrderRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    profiles: Arc<dyn BillingProfileRepository>,
    gateway: Arc<dyn PaymentGateway>,
    policy: CheckoutPolicy,
}

impl StartCheckoutHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        profiles: Arc<dyn BillingProfileRepository>,
        gateway: Arc<dyn PaymentGateway>,
        policy: CheckoutPolicy,
    ) -> Self {
        Self {
            orders,
            subscriptions,
            profiles,
            gateway,
            policy,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, BillingError> {
        // Boundary validation: plan name and required billing fields
        let plan: PlanTier = cmd
            .plan
            .parse()
            .map_err(|_| BillingError::invalid_plan(&cmd.plan))?;

        if let Some(field) = cmd.billing.missing_required_field() {
            return Err(BillingError::missing_billing_field(field));
        }

        // Pricing: conflict rules and the amount owed
        let current = self
            .subscriptions
            .find_current_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?;

        let quote = quote_purchase(
            current.as_ref(),
            plan,
            self.policy.min_charge_minor,
            Timestamp::now(),
        )?;

        if let QuoteKind::Upgrade { from } = quote.kind {
            tracing::info!(
                user_id = %cmd.user_id,
                from = %from,
                to = %plan,
                amount_minor = quote.amount_minor,
                "mid-cycle upgrade priced at flat difference"
            );
        }

        // Ledger entry for this attempt
        let order = Order::create(cmd.user_id.clone(), plan, quote.amount_minor, CURRENCY, false)?;
        self.orders.save(&order).await.map_err(BillingError::from)?;

        // Remember the billing address for later token charges
        let mut profile = self
            .profiles
            .find_by_user(&cmd.user_id)
            .await
            .map_err(BillingError::from)?
            .unwrap_or_else(|| BillingProfile::new(cmd.user_id.clone()));
        profile.billing_address = cmd.billing.clone();
        self.profiles
            .upsert(&profile)
            .await
            .map_err(BillingError::from)?;

        let redirect = self
            .gateway
            .start_hosted_payment(HostedPaymentRequest {
                order_id: order.order_id.clone(),
                amount_minor: order.amount_minor,
                currency: order.currency.clone(),
                billing: cmd.billing,
                setup_recurring: true,
                notify_url: self.policy.notify_url.clone(),
                redirect_url: self.policy.return_url.clone(),
            })
            .await
            .map_err(|e| BillingError::payment_failed(e.to_string()))?;

        Ok(StartCheckoutResult {
            order_id: order.order_id.to_string(),
            amount_minor: order.amount_minor,
            plan,
            redirect,
        })
    }
}
