//! In-memory store
//!
//! Same semantics as the PostgreSQL repositories. Account, ledger and billing
//! state live behind one async mutex, which plays the part of the row lock;
//! the upload hand-off uses a concurrent map whose entry guard plays the
//! part of the session row lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use headshot_types::{
    Account, AccountId, ConsumeOutcome, CreditGrant, GrantOutcome, IdempotencyKey, Identity,
    MobileUpload, Plan, SubscriptionStatus, UploadSession, UploadSessionId,
    MAX_UPLOADS_PER_SESSION,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DbError, DbResult};
use crate::models::{ReconciliationItem, SubscriptionCursor, UploadInsert};
use crate::repo::{
    AccountRepository, BillingStore, BillingUnitOfWork, LedgerRepository,
    MobileUploadRepository, Repositories, SignIn,
};
use crate::rules;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    consumptions: HashMap<(AccountId, String), ConsumeOutcome>,
    /// event id -> outcome label
    events: HashMap<String, Option<String>>,
    cursors: HashMap<String, SubscriptionCursor>,
    reconciliation: Vec<ReconciliationItem>,
}

impl MemoryState {
    fn account_by_customer(&self, customer_id: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|account| account.billing_customer_id.as_deref() == Some(customer_id))
    }
}

/// A hand-off session and the uploads waiting in it
#[derive(Debug, Clone)]
struct SessionSlot {
    session: UploadSession,
    uploads: Vec<MobileUpload>,
    /// Uploads ever stored, including collected ones
    registered: i32,
}

/// In-memory implementation of every repository trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    sessions: Arc<DashMap<UploadSessionId, SessionSlot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events queued for manual reconciliation
    pub async fn reconciliation_queue(&self) -> Vec<ReconciliationItem> {
        self.state.lock().await.reconciliation.clone()
    }

    /// Outcome recorded for a processed event; `None` if never processed
    pub async fn event_outcome(&self, event_id: &str) -> Option<Option<String>> {
        self.state.lock().await.events.get(event_id).cloned()
    }

    pub async fn subscription_cursor(&self, subscription_id: &str) -> Option<SubscriptionCursor> {
        self.state.lock().await.cursors.get(subscription_id).cloned()
    }
}

impl Repositories {
    /// Bundle an in-memory store behind the repository traits
    pub fn in_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            ledger: store.clone(),
            billing: store.clone(),
            uploads: store,
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn find_by_id(&self, id: AccountId) -> DbResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn find_by_subject(&self, subject_id: &str) -> DbResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.subject_id == subject_id)
            .cloned())
    }

    async fn find_by_billing_customer(&self, customer_id: &str) -> DbResult<Option<Account>> {
        Ok(self.state.lock().await.account_by_customer(customer_id).cloned())
    }

    async fn upsert_by_subject(&self, identity: &Identity, initial_credits: i64) -> DbResult<SignIn> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(account) = state
            .accounts
            .values_mut()
            .find(|account| account.subject_id == identity.subject_id)
        {
            account.email.clone_from(&identity.email);
            account.updated_at = now;
            return Ok(SignIn {
                account: account.clone(),
                created: false,
            });
        }

        let account = Account {
            id: AccountId::new(),
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            plan: Plan::Free,
            plan_tier: None,
            credits: initial_credits,
            subscription_status: SubscriptionStatus::None,
            billing_customer_id: None,
            subscription_id: None,
            credit_period_marker: None,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(SignIn {
            account,
            created: true,
        })
    }

    async fn set_billing_customer(&self, id: AccountId, customer_id: &str) -> DbResult<String> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get_mut(&id).ok_or(DbError::NotFound)?;
        if account.billing_customer_id.is_none() {
            account.billing_customer_id = Some(customer_id.to_string());
            account.updated_at = Utc::now();
        }
        account.billing_customer_id.clone().ok_or(DbError::NotFound)
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn consume_credit(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> DbResult<ConsumeOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let record = (account, key.as_str().to_string());
        if let Some(stored) = state.consumptions.get(&record) {
            return Ok(stored.as_replay());
        }

        let entry = state.accounts.get_mut(&account).ok_or(DbError::NotFound)?;
        let outcome = rules::consume(entry, Utc::now());
        state.consumptions.insert(record, outcome);
        Ok(outcome)
    }

    async fn complete_consumption(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
    ) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        let record = (account, key.as_str().to_string());
        match state.consumptions.get_mut(&record) {
            Some(stored) if stored.granted && !stored.completed => {
                stored.completed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn grant_credits(&self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome> {
        let mut state = self.state.lock().await;
        let entry = state.accounts.get_mut(&account).ok_or(DbError::NotFound)?;
        Ok(rules::grant(entry, grant, Utc::now()))
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn begin(&self) -> DbResult<Box<dyn BillingUnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryBillingUnit { guard, working }))
    }
}

/// Unit of work over a private copy of the state, swapped in on commit
pub struct MemoryBillingUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl BillingUnitOfWork for MemoryBillingUnit {
    async fn record_event(&mut self, event_id: &str, _event_type: &str) -> DbResult<bool> {
        if self.working.events.contains_key(event_id) {
            return Ok(false);
        }
        self.working.events.insert(event_id.to_string(), None);
        Ok(true)
    }

    async fn record_outcome(&mut self, event_id: &str, outcome: &str) -> DbResult<()> {
        if let Some(slot) = self.working.events.get_mut(event_id) {
            *slot = Some(outcome.to_string());
        }
        Ok(())
    }

    async fn lock_account_by_customer(&mut self, customer_id: &str) -> DbResult<Option<Account>> {
        Ok(self.working.account_by_customer(customer_id).cloned())
    }

    async fn subscription_cursor(
        &mut self,
        subscription_id: &str,
    ) -> DbResult<Option<SubscriptionCursor>> {
        Ok(self.working.cursors.get(subscription_id).cloned())
    }

    async fn save_subscription_cursor(&mut self, cursor: &SubscriptionCursor) -> DbResult<()> {
        self.working
            .cursors
            .insert(cursor.subscription_id.clone(), cursor.clone());
        Ok(())
    }

    async fn save_account_billing(&mut self, account: &Account) -> DbResult<()> {
        let stored = self
            .working
            .accounts
            .get_mut(&account.id)
            .ok_or(DbError::NotFound)?;
        stored.plan = account.plan;
        stored.plan_tier = account.plan_tier;
        stored.subscription_status = account.subscription_status;
        stored.subscription_id.clone_from(&account.subscription_id);
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn grant_credits(&mut self, account: AccountId, grant: CreditGrant) -> DbResult<GrantOutcome> {
        let entry = self
            .working
            .accounts
            .get_mut(&account)
            .ok_or(DbError::NotFound)?;
        Ok(rules::grant(entry, grant, Utc::now()))
    }

    async fn queue_reconciliation(&mut self, item: &ReconciliationItem) -> DbResult<()> {
        self.working.reconciliation.push(item.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl MobileUploadRepository for MemoryStore {
    async fn create_session(&self, session: &UploadSession) -> DbResult<()> {
        self.sessions.insert(
            session.id,
            SessionSlot {
                session: session.clone(),
                uploads: Vec::new(),
                registered: 0,
            },
        );
        Ok(())
    }

    async fn find_session(&self, id: UploadSessionId) -> DbResult<Option<UploadSession>> {
        Ok(self.sessions.get(&id).map(|slot| slot.session.clone()))
    }

    async fn insert_upload(
        &self,
        upload: &MobileUpload,
        now: DateTime<Utc>,
    ) -> DbResult<UploadInsert> {
        // purge cannot remove the session while the entry guard is held
        let Some(mut slot) = self.sessions.get_mut(&upload.session_id) else {
            return Ok(UploadInsert::SessionClosed);
        };
        if slot.session.is_expired(now) {
            return Ok(UploadInsert::SessionClosed);
        }
        if slot.registered >= MAX_UPLOADS_PER_SESSION {
            return Ok(UploadInsert::SessionFull);
        }
        slot.registered += 1;
        slot.uploads.push(upload.clone());
        Ok(UploadInsert::Stored)
    }

    async fn take_uploads(&self, id: UploadSessionId) -> DbResult<Vec<MobileUpload>> {
        Ok(self
            .sessions
            .get_mut(&id)
            .map(|mut slot| std::mem::take(&mut slot.uploads))
            .unwrap_or_default())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut deleted = 0;
        // uploads go with their session
        self.sessions.retain(|_, slot| {
            let expired = slot.session.is_expired(now);
            if expired {
                deleted += 1;
            }
            !expired
        });
        tracing::debug!(deleted, "purged expired upload sessions");
        Ok(deleted)
    }
}
