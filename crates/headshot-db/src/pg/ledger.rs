//! PostgreSQL credit ledger implementation

use async_trait::async_trait;
use headshot_types::{AccountId, ConsumeOutcome, CreditGrant, GrantOutcome, IdempotencyKey};
use sqlx::{PgConnection, PgPool};

use crate::error::{DbError, DbResult};
use crate::models::ConsumptionRow;
use crate::repo::LedgerRepository;

/// Predicate for accounts whose usage is not metered
const UNMETERED: &str = "plan = 'paid' AND subscription_status IN ('active', 'past_due')";

/// PostgreSQL ledger repository
#[derive(Clone)]
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    /// Create a new ledger repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn consume_credit(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> DbResult<ConsumeOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT credits FROM accounts WHERE id = $1")
            .bind(account.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DbError::NotFound);
        }

        // Claim the key first. A concurrent call with the same key blocks on
        // the primary key until this transaction ends, then sees the conflict.
        let claimed = sqlx::query(
            r#"
            INSERT INTO credit_consumptions (account_id, idempotency_key, granted, credits_remaining)
            VALUES ($1, $2, FALSE, 0)
            ON CONFLICT (account_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(account.0)
        .bind(key.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            let stored = sqlx::query_as::<_, ConsumptionRow>(
                r#"
                SELECT granted, credits_remaining, completed_at IS NOT NULL AS completed
                FROM credit_consumptions
                WHERE account_id = $1 AND idempotency_key = $2
                "#,
            )
            .bind(account.0)
            .bind(key.as_str())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            return Ok(ConsumeOutcome {
                granted: stored.granted,
                credits_remaining: stored.credits_remaining,
                replayed: true,
                completed: stored.completed,
            });
        }

        let sql = format!(
            r#"
            UPDATE accounts
            SET credits = CASE WHEN {UNMETERED} THEN credits ELSE credits - 1 END,
                updated_at = NOW()
            WHERE id = $1 AND (({UNMETERED}) OR credits > 0)
            RETURNING credits
            "#
        );
        let remaining: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(account.0)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match remaining {
            Some((credits,)) => ConsumeOutcome::granted(credits),
            None => ConsumeOutcome::denied(),
        };

        sqlx::query(
            r#"
            UPDATE credit_consumptions
            SET granted = $3, credits_remaining = $4
            WHERE account_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(account.0)
        .bind(key.as_str())
        .bind(outcome.granted)
        .bind(outcome.credits_remaining)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn complete_consumption(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> DbResult<bool> {
        let marked = sqlx::query(
            r#"
            UPDATE credit_consumptions
            SET completed_at = NOW()
            WHERE account_id = $1 AND idempotency_key = $2
              AND granted AND completed_at IS NULL
            "#,
        )
        .bind(account.0)
        .bind(key.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(marked == 1)
    }

    async fn grant_credits(&self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome> {
        let mut conn = self.pool.acquire().await?;
        grant_credits_on(&mut *conn, account, grant).await
    }
}

/// Period-guarded balance reset, shared with the billing unit of work.
pub(crate) async fn grant_credits_on(
    conn: &mut PgConnection,
    account: AccountId,
    grant: CreditGrant,
) -> DbResult<GrantOutcome> {
    let applied: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE accounts
        SET credits = $2, credit_period_marker = $3, updated_at = NOW()
        WHERE id = $1 AND (credit_period_marker IS NULL OR credit_period_marker < $3)
        RETURNING credits
        "#,
    )
    .bind(account.0)
    .bind(grant.amount)
    .bind(grant.period_marker)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((credits,)) = applied {
        return Ok(GrantOutcome::Applied { credits });
    }

    let current: Option<(i64,)> = sqlx::query_as("SELECT credits FROM accounts WHERE id = $1")
        .bind(account.0)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        Some((credits,)) => Ok(GrantOutcome::AlreadyApplied { credits }),
        None => Err(DbError::NotFound),
    }
}
