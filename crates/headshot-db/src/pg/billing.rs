//! PostgreSQL billing store
//!
//! A unit of work is one transaction. The account row is locked with
//! `SELECT ... FOR UPDATE`, so concurrent webhook deliveries for the same
//! account apply one after the other.

use async_trait::async_trait;
use headshot_types::{Account, AccountId, CreditGrant, GrantOutcome};
use sqlx::{PgPool, Postgres, Transaction};

use super::ledger::grant_credits_on;
use crate::error::DbResult;
use crate::models::{AccountRow, ReconciliationItem, SubscriptionCursor, ACCOUNT_COLUMNS};
use crate::repo::{BillingStore, BillingUnitOfWork};

/// PostgreSQL billing store
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn begin(&self) -> DbResult<Box<dyn BillingUnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBillingUnit { tx }))
    }
}

/// Billing transition running inside one transaction
pub struct PgBillingUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingUnitOfWork for PgBillingUnit {
    async fn record_event(&mut self, event_id: &str, event_type: &str) -> DbResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO billing_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn record_outcome(&mut self, event_id: &str, outcome: &str) -> DbResult<()> {
        sqlx::query("UPDATE billing_events SET outcome = $2 WHERE event_id = $1")
            .bind(event_id)
            .bind(outcome)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn lock_account_by_customer(&mut self, customer_id: &str) -> DbResult<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE billing_customer_id = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(customer_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Account::try_from).transpose()
    }

    async fn subscription_cursor(
        &mut self,
        subscription_id: &str,
    ) -> DbResult<Option<SubscriptionCursor>> {
        let cursor = sqlx::query_as::<_, SubscriptionCursor>(
            r#"
            SELECT subscription_id, account_id, last_event_at, ended, past_due, adopted
            FROM subscription_cursors
            WHERE subscription_id = $1
            FOR UPDATE
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(cursor)
    }

    async fn save_subscription_cursor(&mut self, cursor: &SubscriptionCursor) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_cursors
                (subscription_id, account_id, last_event_at, ended, past_due, adopted)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subscription_id)
            DO UPDATE SET account_id = EXCLUDED.account_id,
                          last_event_at = EXCLUDED.last_event_at,
                          ended = EXCLUDED.ended,
                          past_due = EXCLUDED.past_due,
                          adopted = EXCLUDED.adopted
            "#,
        )
        .bind(&cursor.subscription_id)
        .bind(cursor.account_id)
        .bind(cursor.last_event_at)
        .bind(cursor.ended)
        .bind(cursor.past_due)
        .bind(cursor.adopted)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn save_account_billing(&mut self, account: &Account) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET plan = $2, plan_tier = $3, subscription_status = $4,
                subscription_id = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account.id.0)
        .bind(account.plan.as_str())
        .bind(account.plan_tier.map(|tier| tier.as_str()))
        .bind(account.subscription_status.as_str())
        .bind(&account.subscription_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn grant_credits(&mut self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome> {
        grant_credits_on(&mut *self.tx, account, grant).await
    }

    async fn queue_reconciliation(&mut self, item: &ReconciliationItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_reconciliation (id, event_id, event_type, customer_id, reason, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id)
        .bind(&item.event_id)
        .bind(&item.event_type)
        .bind(&item.customer_id)
        .bind(&item.reason)
        .bind(&item.payload)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
