//! PostgreSQL account repository implementation

use async_trait::async_trait;
use headshot_types::{Account, AccountId, Identity};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{AccountRow, SignInRow, ACCOUNT_COLUMNS};
use crate::repo::{AccountRepository, SignIn};

/// PostgreSQL account repository
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, value: &str) -> DbResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> DbResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_subject(&self, subject_id: &str) -> DbResult<Option<Account>> {
        self.find_where("subject_id", subject_id).await
    }

    async fn find_by_billing_customer(&self, customer_id: &str) -> DbResult<Option<Account>> {
        self.find_where("billing_customer_id", customer_id).await
    }

    async fn upsert_by_subject(&self, identity: &Identity, initial_credits: i64) -> DbResult<SignIn> {
        // xmax is zero only for a tuple written by INSERT in this statement
        let sql = format!(
            r#"
            INSERT INTO accounts (id, subject_id, email, plan, credits, subscription_status)
            VALUES ($1, $2, $3, 'free', $4, 'none')
            ON CONFLICT (subject_id)
            DO UPDATE SET email = EXCLUDED.email, updated_at = NOW()
            RETURNING {ACCOUNT_COLUMNS}, (xmax = 0) AS inserted
            "#
        );
        let row = sqlx::query_as::<_, SignInRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&identity.subject_id)
            .bind(&identity.email)
            .bind(initial_credits)
            .fetch_one(&self.pool)
            .await?;

        Ok(SignIn {
            created: row.inserted,
            account: row.account.try_into()?,
        })
    }

    async fn set_billing_customer(&self, id: AccountId, customer_id: &str) -> DbResult<String> {
        let stored: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET billing_customer_id = COALESCE(billing_customer_id, $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING billing_customer_id
            "#,
        )
        .bind(id.0)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        stored.and_then(|(customer,)| customer).ok_or(DbError::NotFound)
    }
}
