//! Account sign-in

use std::sync::Arc;

use headshot_db::AccountRepository;
use headshot_types::{Account, AccountId, Identity, FREE_TIER_CREDITS};
use tracing::instrument;

use crate::LedgerError;

/// Account lifecycle operations outside the ledger
#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Ensure an account exists for a verified identity.
    ///
    /// Idempotent: keyed by the immutable subject ID. New accounts start on
    /// the free plan with [`FREE_TIER_CREDITS`]; existing ones only get their
    /// email refreshed.
    #[instrument(skip(self, identity), fields(subject_id = %identity.subject_id))]
    pub async fn sign_in(&self, identity: &Identity) -> Result<Account, LedgerError> {
        if identity.subject_id.trim().is_empty() {
            return Err(LedgerError::InvalidIdentity("subject id is empty"));
        }
        if !identity.email.contains('@') {
            return Err(LedgerError::InvalidIdentity("email is malformed"));
        }

        let sign_in = self
            .accounts
            .upsert_by_subject(identity, FREE_TIER_CREDITS)
            .await?;

        if sign_in.created {
            tracing::info!(account_id = %sign_in.account.id, "Account created");
            metrics::counter!("headshot_accounts_created_total").increment(1);
        }

        Ok(sign_in.account)
    }

    pub async fn get(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn find_by_subject(&self, subject_id: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.find_by_subject(subject_id).await?)
    }
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService").finish_non_exhaustive()
    }
}
