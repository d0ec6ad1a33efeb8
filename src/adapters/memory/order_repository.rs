//! In-memory implementation of OrderRepository.
//!
//! Backs tests and local development. Mirrors the conditional-update
//! semantics of the Postgres adapter: terminal transitions are applied
//! under a single write lock, so duplicate callers observe a terminal row.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Order, OrderStatus};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, Timestamp, UserId};
use crate::ports::{OrderRepository, TransitionOutcome};

/// In-memory order ledger.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all orders, for assertions in tests.
    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }
}

fn not_found(order_id: &OrderId) -> DomainError {
    DomainError::new(
        ErrorCode::OrderNotFound,
        format!("Order not found: {}", order_id),
    )
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), DomainError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn complete(
        &self,
        order_id: &OrderId,
        external_transaction_id: &str,
        token: Option<&str>,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(order_id).ok_or_else(|| not_found(order_id))?;

        match order.status {
            OrderStatus::Pending => {
                order
                    .complete(external_transaction_id, token.map(str::to_string))
                    .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))?;
                Ok(TransitionOutcome::Applied)
            }
            OrderStatus::Completed => Ok(TransitionOutcome::AlreadyInTarget),
            OrderStatus::Failed => Ok(TransitionOutcome::AlreadyTerminal(OrderStatus::Failed)),
        }
    }

    async fn fail(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(order_id).ok_or_else(|| not_found(order_id))?;

        match order.status {
            OrderStatus::Pending => {
                order
                    .fail(reason)
                    .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))?;
                Ok(TransitionOutcome::Applied)
            }
            OrderStatus::Failed => Ok(TransitionOutcome::AlreadyInTarget),
            OrderStatus::Completed => {
                Ok(TransitionOutcome::AlreadyTerminal(OrderStatus::Completed))
            }
        }
    }

    async fn record_pending_error(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), DomainError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(order_id).ok_or_else(|| not_found(order_id))?;
        if order.status == OrderStatus::Pending {
            order.last_error = Some(reason.to_string());
            order.updated_at = Timestamp::now();
        }
        Ok(())
    }

    async fn find_latest_completed_for_user(
        &self,
        user_id: &UserId,
        within_days: Option<i64>,
    ) -> Result<Option<Order>, DomainError> {
        let orders = self.orders.read().await;
        let cutoff = within_days.map(|d| Timestamp::now().minus_days(d));

        Ok(orders
            .values()
            .filter(|o| &o.user_id == user_id && o.status == OrderStatus::Completed)
            .filter(|o| cutoff.map_or(true, |c| o.created_at >= c))
            .max_by_key(|o| o.created_at)
            .cloned())
    }
}
