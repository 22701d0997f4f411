//! Repository traits
//!
//! Define async repository interfaces for database operations. Every trait
//! has a PostgreSQL implementation in [`crate::pg`] and an in-memory one in
//! [`crate::memory`] with the same semantics.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use headshot_types::{
    Account, AccountId, ConsumeOutcome, CreditGrant, GrantOutcome, IdempotencyKey, Identity,
    MobileUpload, UploadSession, UploadSessionId,
};

use crate::error::DbResult;
use crate::models::{ReconciliationItem, SubscriptionCursor, UploadInsert};

/// Result of a sign-in upsert
#[derive(Debug, Clone)]
pub struct SignIn {
    pub account: Account,
    /// True when this sign-in created the account
    pub created: bool,
}

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find an account by ID
    async fn find_by_id(&self, id: AccountId) -> DbResult<Option<Account>>;

    /// Find an account by identity-provider subject
    async fn find_by_subject(&self, subject_id: &str) -> DbResult<Option<Account>>;

    /// Find an account by payment-provider customer ID
    async fn find_by_billing_customer(&self, customer_id: &str) -> DbResult<Option<Account>>;

    /// Create the account for `identity.subject_id` with `initial_credits`,
    /// or refresh the email of the existing one.
    async fn upsert_by_subject(&self, identity: &Identity, initial_credits: i64) -> DbResult<SignIn>;

    /// Attach a payment-provider customer if none is attached yet.
    ///
    /// Returns the customer ID stored after the call, which is the existing
    /// one when another request won the race.
    async fn set_billing_customer(&self, id: AccountId, customer_id: &str) -> DbResult<String>;
}

/// Credit ledger storage
///
/// Every operation is a single atomic unit: no caller ever reads `credits`
/// and writes it back separately.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Spend one credit unless the account is on an unmetered paid plan.
    ///
    /// The decision is stored under `(account, key)`; a repeated key returns
    /// the stored decision with `replayed` set and changes nothing.
    /// Returns [`crate::DbError::NotFound`] for an unknown account.
    async fn consume_credit(&self, account: AccountId, key: &IdempotencyKey)
        -> DbResult<ConsumeOutcome>;

    /// Mark the attempt paid for under `(account, key)` as finished, so a
    /// later replay of the key reports `completed`. Returns false when no
    /// credit was granted under the key or it was already marked.
    async fn complete_consumption(&self, account: AccountId, key: &IdempotencyKey)
        -> DbResult<bool>;

    /// Reset the balance to `grant.amount` if `grant.period_marker` is newer
    /// than the period of the current balance.
    async fn grant_credits(&self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome>;
}

/// Entry point for atomic billing transitions
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Begin a unit of work. Dropping it without [`BillingUnitOfWork::commit`]
    /// discards every change made through it.
    async fn begin(&self) -> DbResult<Box<dyn BillingUnitOfWork>>;
}

/// One atomic billing transition
#[async_trait]
pub trait BillingUnitOfWork: Send {
    /// Record a provider event as processed. Returns false if it already was.
    async fn record_event(&mut self, event_id: &str, event_type: &str) -> DbResult<bool>;

    /// Store the outcome label of an event recorded in this unit
    async fn record_outcome(&mut self, event_id: &str, outcome: &str) -> DbResult<()>;

    /// Load the account for a customer, excluding concurrent transitions on it
    /// until this unit ends.
    async fn lock_account_by_customer(&mut self, customer_id: &str) -> DbResult<Option<Account>>;

    async fn subscription_cursor(&mut self, subscription_id: &str)
        -> DbResult<Option<SubscriptionCursor>>;

    async fn save_subscription_cursor(&mut self, cursor: &SubscriptionCursor) -> DbResult<()>;

    /// Persist plan, tier, status and subscription reference of `account`
    async fn save_account_billing(&mut self, account: &Account) -> DbResult<()>;

    /// Same contract as [`LedgerRepository::grant_credits`], inside this unit
    async fn grant_credits(&mut self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome>;

    async fn queue_reconciliation(&mut self, item: &ReconciliationItem) -> DbResult<()>;

    async fn commit(self: Box<Self>) -> DbResult<()>;
}

/// Mobile upload hand-off storage
#[async_trait]
pub trait MobileUploadRepository: Send + Sync {
    async fn create_session(&self, session: &UploadSession) -> DbResult<()>;

    async fn find_session(&self, id: UploadSessionId) -> DbResult<Option<UploadSession>>;

    /// Store `upload` if its session exists, has not expired at `now` and
    /// has room left. The check and the insert are atomic.
    async fn insert_upload(&self, upload: &MobileUpload, now: DateTime<Utc>)
        -> DbResult<UploadInsert>;

    /// Remove and return every upload of the session
    async fn take_uploads(&self, id: UploadSessionId) -> DbResult<Vec<MobileUpload>>;

    /// Delete sessions expired at `now` together with their uploads.
    /// Returns the number of sessions deleted.
    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;
}

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub billing: Arc<dyn BillingStore>,
    pub uploads: Arc<dyn MobileUploadRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
