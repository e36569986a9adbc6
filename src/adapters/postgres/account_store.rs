//! PostgreSQL implementation of AccountStore.
//!
//! Subscription writes are a single conditional `UPDATE` guarded by
//! `subscription_event_at`, so last-write-wins holds across instances
//! without any in-process locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    Account, GenericFields, LegacyCardFields, ProviderKind, SubscriptionStatus,
    SubscriptionWrite,
};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode};
use crate::ports::{AccountStore, UpdateOutcome};

const SELECT_ACCOUNT: &str = r#"
    SELECT id, name, billing_email,
           payment_provider, payment_customer_id, payment_subscription_id, payment_product_id,
           plan_name, subscription_status, subscription_event_at,
           stripe_customer_id, stripe_subscription_id, stripe_product_id
    FROM accounts
"#;

/// PostgreSQL implementation of the AccountStore port.
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    /// Creates a new PostgresAccountStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new account row.
    pub async fn insert(&self, account: &Account) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, name, billing_email,
                payment_provider, payment_customer_id, payment_subscription_id, payment_product_id,
                plan_name, subscription_status, subscription_event_at,
                stripe_customer_id, stripe_subscription_id, stripe_product_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.name)
        .bind(&account.billing_email)
        .bind(account.generic.provider.map(|p| p.as_str()))
        .bind(&account.generic.customer_id)
        .bind(&account.generic.subscription_id)
        .bind(&account.generic.product_id)
        .bind(&account.plan_name)
        .bind(account.subscription_status.map(|s| s.as_str()))
        .bind(account.subscription_event_at)
        .bind(&account.legacy_card.customer_id)
        .bind(&account.legacy_card.subscription_id)
        .bind(&account.legacy_card.product_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert account", e))?;
        Ok(())
    }

    async fn fetch_one(
        &self,
        filter: &str,
        bind_provider: Option<ProviderKind>,
        value: &str,
    ) -> Result<Option<Account>, DomainError> {
        let sql = format!("{} {} LIMIT 1", SELECT_ACCOUNT, filter);
        let mut query = sqlx::query_as::<_, AccountRow>(&sql).bind(value);
        if let Some(provider) = bind_provider {
            query = query.bind(provider.as_str());
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find account", e))?
            .map(Account::try_from)
            .transpose()
    }

    async fn fetch_all(
        &self,
        filter: &str,
        bind_provider: Option<ProviderKind>,
    ) -> Result<Vec<Account>, DomainError> {
        let sql = format!("{} {} ORDER BY name, id", SELECT_ACCOUNT, filter);
        let mut query = sqlx::query_as::<_, AccountRow>(&sql);
        if let Some(provider) = bind_provider {
            query = query.bind(provider.as_str());
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list accounts", e))?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn exists(&self, id: &AccountId) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("check account", e))
    }
}

fn db_error(operation: &str, e: sqlx::Error) -> DomainError {
    tracing::error!(operation, error = %e, "Account store query failed");
    DomainError::database(format!("Failed to {}: {}", operation, e))
}

/// Database row representation of an account.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    billing_email: Option<String>,
    payment_provider: Option<String>,
    payment_customer_id: Option<String>,
    payment_subscription_id: Option<String>,
    payment_product_id: Option<String>,
    plan_name: Option<String>,
    subscription_status: Option<String>,
    subscription_event_at: Option<DateTime<Utc>>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_product_id: Option<String>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let provider = row
            .payment_provider
            .as_deref()
            .map(|p| {
                p.parse::<ProviderKind>().map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid provider: {}", e))
                })
            })
            .transpose()?;

        Ok(Account {
            id: AccountId::from_uuid(row.id),
            name: row.name,
            billing_email: row.billing_email,
            generic: GenericFields {
                provider,
                customer_id: row.payment_customer_id,
                subscription_id: row.payment_subscription_id,
                product_id: row.payment_product_id,
            },
            plan_name: row.plan_name,
            subscription_status: row
                .subscription_status
                .as_deref()
                .map(SubscriptionStatus::from_native),
            subscription_event_at: row.subscription_event_at,
            legacy_card: LegacyCardFields {
                customer_id: row.stripe_customer_id,
                subscription_id: row.stripe_subscription_id,
                product_id: row.stripe_product_id,
            },
        })
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        sqlx::query_as::<_, AccountRow>(&format!("{} WHERE id = $1", SELECT_ACCOUNT))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find account", e))?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_by_provider_customer_id(
        &self,
        provider: ProviderKind,
        customer_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        if customer_id.is_empty() {
            return Ok(None);
        }
        let filter = match provider {
            ProviderKind::Card => {
                "WHERE (payment_provider = $2 AND payment_customer_id = $1) \
                 OR stripe_customer_id = $1"
            }
            ProviderKind::Wallet => "WHERE payment_provider = $2 AND payment_customer_id = $1",
        };
        self.fetch_one(filter, Some(provider), customer_id).await
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: ProviderKind,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        if subscription_id.is_empty() {
            return Ok(None);
        }
        self.fetch_one(
            "WHERE payment_provider = $2 AND payment_subscription_id = $1",
            Some(provider),
            subscription_id,
        )
        .await
    }

    async fn apply_subscription_change(
        &self,
        id: &AccountId,
        write: &SubscriptionWrite,
    ) -> Result<UpdateOutcome, DomainError> {
        let legacy = write.legacy_card.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                payment_provider = $2,
                payment_customer_id = $3,
                payment_subscription_id = $4,
                payment_product_id = $5,
                plan_name = $6,
                subscription_status = $7,
                subscription_event_at = $8,
                stripe_customer_id = CASE WHEN $9 THEN $10 ELSE stripe_customer_id END,
                stripe_subscription_id = CASE WHEN $9 THEN $11 ELSE stripe_subscription_id END,
                stripe_product_id = CASE WHEN $9 THEN $12 ELSE stripe_product_id END,
                updated_at = NOW()
            WHERE id = $1
              AND (subscription_event_at IS NULL OR subscription_event_at <= $8)
            "#,
        )
        .bind(id.as_uuid())
        .bind(write.generic.provider.map(|p| p.as_str()))
        .bind(&write.generic.customer_id)
        .bind(&write.generic.subscription_id)
        .bind(&write.generic.product_id)
        .bind(&write.plan_name)
        .bind(write.status.as_str())
        .bind(write.occurred_at)
        .bind(legacy.is_some())
        .bind(legacy.and_then(|l| l.customer_id.clone()))
        .bind(legacy.and_then(|l| l.subscription_id.clone()))
        .bind(legacy.and_then(|l| l.product_id.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("apply subscription change", e))?;

        if result.rows_affected() > 0 {
            return Ok(UpdateOutcome::Applied);
        }
        if self.exists(id).await? {
            Ok(UpdateOutcome::Stale)
        } else {
            Ok(UpdateOutcome::NotFound)
        }
    }

    async fn update_generic_fields(
        &self,
        id: &AccountId,
        generic: &GenericFields,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                payment_provider = $2,
                payment_customer_id = $3,
                payment_subscription_id = $4,
                payment_product_id = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(generic.provider.map(|p| p.as_str()))
        .bind(&generic.customer_id)
        .bind(&generic.subscription_id)
        .bind(&generic.product_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update generic fields", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::account_not_found(id));
        }
        Ok(())
    }

    async fn list_accounts_by_provider(
        &self,
        provider: ProviderKind,
    ) -> Result<Vec<Account>, DomainError> {
        self.fetch_all("WHERE payment_provider = $1", Some(provider))
            .await
    }

    async fn list_accounts_with_legacy_card_customer(&self) -> Result<Vec<Account>, DomainError> {
        self.fetch_all(
            "WHERE stripe_customer_id IS NOT NULL AND stripe_customer_id <> ''",
            None,
        )
        .await
    }

    async fn set_legacy_fields(
        &self,
        id: &AccountId,
        legacy: &LegacyCardFields,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                stripe_customer_id = $2,
                stripe_subscription_id = $3,
                stripe_product_id = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&legacy.customer_id)
        .bind(&legacy.subscription_id)
        .bind(&legacy.product_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("set legacy fields", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::account_not_found(id));
        }
        Ok(())
    }
}
