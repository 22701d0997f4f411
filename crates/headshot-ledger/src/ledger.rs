//! Entitlement ledger
//!
//! The only component allowed to change an account's `credits`. Every paid
//! action passes through [`EntitlementLedger::try_consume_credit`] before any
//! external work starts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use headshot_db::{AccountRepository, LedgerRepository};
use headshot_types::{
    AccountId, ConsumeOutcome, CreditBalance, CreditGrant, GrantOutcome, IdempotencyKey,
};
use tracing::instrument;

use crate::LedgerError;

/// Entitlement ledger
#[derive(Clone)]
pub struct EntitlementLedger {
    accounts: Arc<dyn AccountRepository>,
    store: Arc<dyn LedgerRepository>,
}

impl EntitlementLedger {
    /// Create a new ledger over the given repositories
    pub fn new(accounts: Arc<dyn AccountRepository>, store: Arc<dyn LedgerRepository>) -> Self {
        Self { accounts, store }
    }

    /// Atomically spend one credit for the attempt identified by `key`.
    ///
    /// Paid accounts with an attached subscription are always granted and
    /// their balance is left alone. A repeated `key` returns the decision
    /// made the first time without spending again.
    #[instrument(skip(self, key), fields(account_id = %account, key = %key))]
    pub async fn try_consume_credit(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> Result<ConsumeOutcome, LedgerError> {
        let outcome = self.store.consume_credit(account, key).await?;

        if outcome.replayed {
            tracing::debug!(granted = outcome.granted, "Replayed credit decision");
            metrics::counter!("headshot_credit_replays_total").increment(1);
        } else if outcome.granted {
            tracing::info!(
                credits_remaining = outcome.credits_remaining,
                "Credit consumed"
            );
            metrics::counter!("headshot_credits_consumed_total").increment(1);
        } else {
            tracing::info!("Credit denied, balance exhausted");
            metrics::counter!("headshot_credits_denied_total").increment(1);
        }

        Ok(outcome)
    }

    /// Record that the attempt paid for under `key` delivered its result.
    ///
    /// Returns false if the attempt was already recorded as finished, which
    /// means a concurrent retry of the same key delivered first.
    #[instrument(skip(self, key), fields(account_id = %account, key = %key))]
    pub async fn complete_attempt(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> Result<bool, LedgerError> {
        Ok(self.store.complete_consumption(account, key).await?)
    }

    /// Reset the balance to `amount` for the billing period `period_marker`.
    ///
    /// A grant for a period that is not newer than the current balance's
    /// period is a no-op, so a redelivered refill never applies twice.
    #[instrument(skip(self), fields(account_id = %account))]
    pub async fn grant_credits(
        &self,
        account: AccountId,
        amount: i64,
        period_marker: DateTime<Utc>,
    ) -> Result<GrantOutcome, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let outcome = self
            .store
            .grant_credits(
                account,
                CreditGrant {
                    amount,
                    period_marker,
                },
            )
            .await?;

        tracing::info!(
            applied = outcome.was_applied(),
            credits = outcome.credits(),
            "Credit grant processed"
        );
        Ok(outcome)
    }

    /// Current entitlement, read only
    pub async fn balance(&self, account: AccountId) -> Result<CreditBalance, LedgerError> {
        let account = self
            .accounts
            .find_by_id(account)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        Ok(CreditBalance {
            account_id: account.id,
            credits: account.credits,
            unlimited: account.has_unlimited_usage(),
        })
    }
}

impl std::fmt::Debug for EntitlementLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementLedger").finish_non_exhaustive()
    }
}
