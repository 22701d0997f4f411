//! PostgreSQL repository implementations

mod account;
mod billing;
mod ledger;
mod upload;

use std::sync::Arc;

pub use account::PgAccountRepository;
pub use billing::{PgBillingStore, PgBillingUnit};
pub use ledger::PgLedgerRepository;
pub use upload::PgMobileUploadRepository;

use crate::repo::Repositories;
use crate::DbPool;

impl Repositories {
    /// Create all repositories from a database pool
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            ledger: Arc::new(PgLedgerRepository::new(pool.clone())),
            billing: Arc::new(PgBillingStore::new(pool.clone())),
            uploads: Arc::new(PgMobileUploadRepository::new(pool)),
        }
    }
}
