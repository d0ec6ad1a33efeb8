//! PostgreSQL implementation of OrderRepository.
//!
//! Terminal transitions are single conditional UPDATEs guarded on
//! `status = 'pending'`, so concurrent notification deliveries resolve to
//! exactly one winner at the database level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{Order, OrderStatus, PlanTier};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, Timestamp, UserId};
use crate::ports::{OrderRepository, TransitionOutcome};

/// PostgreSQL implementation of the OrderRepository port.
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reads the stored status of an order, if it exists.
    async fn current_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>, DomainError> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM orders WHERE order_id = $1")
                .bind(order_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        status.map(|(s,)| parse_status(&s)).transpose()
    }
}

/// Database row representation of an order.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    user_id: String,
    plan: String,
    amount_minor: i64,
    currency: String,
    status: String,
    is_recurring: bool,
    token: Option<String>,
    external_transaction_id: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: OrderId::new(row.order_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            plan: parse_plan(&row.plan)?,
            amount_minor: row.amount_minor,
            currency: row.currency,
            status: parse_status(&row.status)?,
            is_recurring: row.is_recurring,
            token: row.token,
            external_transaction_id: row.external_transaction_id,
            last_error: row.last_error,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn parse_plan(s: &str) -> Result<PlanTier, DomainError> {
    s.parse()
        .map_err(|_| DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", s)))
}

fn parse_status(s: &str) -> Result<OrderStatus, DomainError> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "completed" => Ok(OrderStatus::Completed),
        "failed" => Ok(OrderStatus::Failed),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )),
    }
}

fn status_to_string(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Completed => "completed",
        OrderStatus::Failed => "failed",
    }
}

fn plan_to_string(plan: &PlanTier) -> &'static str {
    match plan {
        PlanTier::Bronze => "bronze",
        PlanTier::Basic => "basic",
        PlanTier::Premium => "premium",
        PlanTier::Gold => "gold",
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Order query failed: {}", e))
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, user_id, plan, amount_minor, currency, status, is_recurring,
                token, external_transaction_id, last_error, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(order.user_id.as_str())
        .bind(plan_to_string(&order.plan))
        .bind(order.amount_minor)
        .bind(&order.currency)
        .bind(status_to_string(&order.status))
        .bind(order.is_recurring)
        .bind(&order.token)
        .bind(&order.external_transaction_id)
        .bind(&order.last_error)
        .bind(order.created_at.as_datetime())
        .bind(order.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT order_id, user_id, plan, amount_minor, currency, status, is_recurring,
                   token, external_transaction_id, last_error, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Order::try_from).transpose()
    }

    async fn complete(
        &self,
        order_id: &OrderId,
        external_transaction_id: &str,
        token: Option<&str>,
    ) -> Result<TransitionOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'completed',
                external_transaction_id = $2,
                token = COALESCE($3, token),
                updated_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id.as_str())
        .bind(external_transaction_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() > 0 {
            return Ok(TransitionOutcome::Applied);
        }

        // Lost the conditional update: classify by the stored status
        match self.current_status(order_id).await? {
            Some(OrderStatus::Completed) => Ok(TransitionOutcome::AlreadyInTarget),
            Some(status) => Ok(TransitionOutcome::AlreadyTerminal(status)),
            None => Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", order_id),
            )),
        }
    }

    async fn fail(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'failed',
                last_error = $2,
                updated_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() > 0 {
            return Ok(TransitionOutcome::Applied);
        }

        match self.current_status(order_id).await? {
            Some(OrderStatus::Failed) => Ok(TransitionOutcome::AlreadyInTarget),
            Some(status) => Ok(TransitionOutcome::AlreadyTerminal(status)),
            None => Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", order_id),
            )),
        }
    }

    async fn record_pending_error(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE orders SET last_error = $2, updated_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_latest_completed_for_user(
        &self,
        user_id: &UserId,
        within_days: Option<i64>,
    ) -> Result<Option<Order>, DomainError> {
        let cutoff = within_days.map(|d| Utc::now() - chrono::Duration::days(d));

        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT order_id, user_id, plan, amount_minor, currency, status, is_recurring,
                   token, external_transaction_id, last_error, created_at, updated_at
            FROM orders
            WHERE user_id = $1
              AND status = 'completed'
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Order::try_from).transpose()
    }
}
