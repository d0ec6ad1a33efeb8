//! PostgreSQL implementation of SubscriptionRepository.
//!
//! One non-expired row per user is enforced by a partial unique index on
//! `user_id WHERE status <> 'expired'`; `upsert_current` retires the old
//! row and inserts the new one in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{PlanTier, Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    /// Creates a repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    plan: String,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    amount_minor: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            plan: parse_plan(&row.plan)?,
            status: parse_status(&row.status)?,
            start_date: Timestamp::from_datetime(row.start_date),
            end_date: Timestamp::from_datetime(row.end_date),
            amount_minor: row.amount_minor,
            currency: row.currency,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn parse_plan(s: &str) -> Result<PlanTier, DomainError> {
    s.parse()
        .map_err(|_| DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", s)))
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "active" => Ok(SubscriptionStatus::Active),
        "cancelled" => Ok(SubscriptionStatus::Cancelled),
        "expired" => Ok(SubscriptionStatus::Expired),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )),
    }
}

fn status_to_string(status: &SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Cancelled => "cancelled",
        SubscriptionStatus::Expired => "expired",
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
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Subscription query failed: {}", e),
    )
}

const SELECT_COLUMNS: &str = "id, user_id, plan, status, start_date, end_date, \
                              amount_minor, currency, created_at, updated_at";

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn upsert_current(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Retire whatever current row exists; expired rows stay as history
        sqlx::query(
            r#"
            UPDATE subscriptions SET status = 'expired', updated_at = NOW()
            WHERE user_id = $1 AND status <> 'expired'
            "#,
        )
        .bind(subscription.user_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan, status, start_date, end_date,
                amount_minor, currency, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(plan_to_string(&subscription.plan))
        .bind(status_to_string(&subscription.status))
        .bind(subscription.start_date.as_datetime())
        .bind(subscription.end_date.as_datetime())
        .bind(subscription.amount_minor)
        .bind(&subscription.currency)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan = $2,
                status = $3,
                start_date = $4,
                end_date = $5,
                amount_minor = $6,
                currency = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(plan_to_string(&subscription.plan))
        .bind(status_to_string(&subscription.status))
        .bind(subscription.start_date.as_datetime())
        .bind(subscription.end_date.as_datetime())
        .bind(subscription.amount_minor)
        .bind(&subscription.currency)
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            ));
        }

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_current_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE user_id = $1
              AND (status = 'active' OR (status = 'cancelled' AND end_date >= NOW()))
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_due_for_renewal(
        &self,
        now: Timestamp,
        renew_ahead_days: i64,
        grace_days: i64,
    ) -> Result<Vec<Subscription>, DomainError> {
        let now = *now.as_datetime();
        let ahead_cutoff = now + chrono::Duration::days(renew_ahead_days);
        let grace_cutoff = now - chrono::Duration::days(grace_days);

        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE (status = 'active' AND end_date <= $1)
               OR (status = 'expired' AND end_date >= $2 AND end_date <= $3)
            ORDER BY end_date ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(ahead_cutoff)
        .bind(grace_cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn find_lapsed(&self, now: Timestamp) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE status <> 'expired' AND end_date < $1
            ORDER BY end_date ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
