//! Application state for the Headshot API service.

use std::sync::Arc;

use headshot_billing_core::{BillingService, PaymentProvider};
use headshot_db::{DbPool, Repositories};
use headshot_imaging::{ImageGenerator, MobileHandoff, Studio};
use headshot_ledger::{AccountService, EntitlementLedger};

use crate::config::Config;
use crate::extractors::TokenVerifier;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Account sign-in and lookup
    pub accounts: AccountService,
    /// Credit balance reads
    pub ledger: EntitlementLedger,
    /// Billing state machine, checkout and portal
    pub billing: Arc<BillingService>,
    /// Consume-then-generate orchestration
    pub studio: Studio,
    /// Phone-to-desktop upload hand-off
    pub handoff: MobileHandoff,
    /// Identity provider token verification
    pub tokens: Arc<TokenVerifier>,
    /// Database pool, absent when running on the in-memory store
    pub pool: Option<DbPool>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the services over `repos`
    pub fn new(
        repos: Repositories,
        pool: Option<DbPool>,
        provider: Arc<dyn PaymentProvider>,
        generator: Arc<dyn ImageGenerator>,
        config: Config,
    ) -> Self {
        let accounts = AccountService::new(repos.accounts.clone());
        let ledger = EntitlementLedger::new(repos.accounts.clone(), repos.ledger.clone());
        let studio =
            Studio::new(ledger.clone(), generator).with_timeout(config.generation_timeout);
        let handoff = MobileHandoff::new(repos.uploads.clone());
        let billing = BillingService::new(repos, provider, config.billing.clone());
        let tokens = TokenVerifier::new(&config.jwt_secret, config.jwt_issuer.as_deref());

        Self {
            accounts,
            ledger,
            billing: Arc::new(billing),
            studio,
            handoff,
            tokens: Arc::new(tokens),
            pool,
            config: Arc::new(config),
        }
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("studio", &self.studio)
            .field("persistent", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}
