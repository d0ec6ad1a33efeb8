//! PostgreSQL implementation of BillingProfileRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{BillingAddress, BillingProfile, PlanTier};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::BillingProfileRepository;

/// PostgreSQL implementation of the BillingProfileRepository port.
pub struct PostgresBillingProfileRepository {
    pool: PgPool,
}

impl PostgresBillingProfileRepository {
    /// Creates a repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a billing profile.
#[derive(Debug, sqlx::FromRow)]
struct BillingProfileRow {
    user_id: String,
    plan_type: String,
    recurring_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    auto_renew: bool,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    address: String,
    city: String,
    country: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BillingProfileRow> for BillingProfile {
    type Error = DomainError;

    fn try_from(row: BillingProfileRow) -> Result<Self, Self::Error> {
        let plan_type: PlanTier = row.plan_type.parse().map_err(|_| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid plan value: {}", row.plan_type),
            )
        })?;

        Ok(BillingProfile {
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            plan_type,
            recurring_token: row.recurring_token,
            token_expiry: row.token_expiry.map(Timestamp::from_datetime),
            auto_renew: row.auto_renew,
            billing_address: BillingAddress {
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                phone: row.phone,
                address: row.address,
                city: row.city,
                country: row.country,
            },
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Billing profile query failed: {}", e),
    )
}

#[async_trait]
impl BillingProfileRepository for PostgresBillingProfileRepository {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<BillingProfile>, DomainError> {
        let row: Option<BillingProfileRow> = sqlx::query_as(
            r#"
            SELECT user_id, plan_type, recurring_token, token_expiry, auto_renew,
                   first_name, last_name, email, phone, address, city, country, updated_at
            FROM billing_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(BillingProfile::try_from).transpose()
    }

    async fn upsert(&self, profile: &BillingProfile) -> Result<(), DomainError> {
        let plan_type = match profile.plan_type {
            PlanTier::Bronze => "bronze",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Gold => "gold",
        };

        sqlx::query(
            r#"
            INSERT INTO billing_profiles (
                user_id, plan_type, recurring_token, token_expiry, auto_renew,
                first_name, last_name, email, phone, address, city, country, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_type = EXCLUDED.plan_type,
                recurring_token = EXCLUDED.recurring_token,
                token_expiry = EXCLUDED.token_expiry,
                auto_renew = EXCLUDED.auto_renew,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                city = EXCLUDED.city,
                country = EXCLUDED.country,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.user_id.as_str())
        .bind(plan_type)
        .bind(&profile.recurring_token)
        .bind(profile.token_expiry.as_ref().map(|t| *t.as_datetime()))
        .bind(profile.auto_renew)
        .bind(&profile.billing_address.first_name)
        .bind(&profile.billing_address.last_name)
        .bind(&profile.billing_address.email)
        .bind(&profile.billing_address.phone)
        .bind(&profile.billing_address.address)
        .bind(&profile.billing_address.city)
        .bind(&profile.billing_address.country)
        .bind(profile.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}
