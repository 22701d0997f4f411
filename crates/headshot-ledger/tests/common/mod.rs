//! Shared fixtures for ledger tests

use std::sync::Arc;

use headshot_db::{AccountRepository, BillingStore, MemoryStore};
use headshot_ledger::{AccountService, EntitlementLedger};
use headshot_types::{Account, Identity, Plan, PlanTier, SubscriptionStatus};

pub struct Fixture {
    pub store: MemoryStore,
    pub accounts: AccountService,
    pub ledger: EntitlementLedger,
}

pub fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let shared = Arc::new(store.clone());
    Fixture {
        accounts: AccountService::new(shared.clone()),
        ledger: EntitlementLedger::new(shared.clone(), shared),
        store,
    }
}

pub fn identity(subject: &str) -> Identity {
    Identity {
        subject_id: subject.to_string(),
        email: format!("{subject}@example.com"),
    }
}

/// Put an account on a paid plan the way a billing transition would
#[allow(dead_code)]
pub async fn make_paid(store: &MemoryStore, account: &Account, status: SubscriptionStatus) {
    store
        .set_billing_customer(account.id, &format!("cus_{}", account.id))
        .await
        .unwrap();
    let mut paid = account.clone();
    paid.plan = Plan::Paid;
    paid.plan_tier = Some(PlanTier::Unlimited);
    paid.subscription_status = status;
    paid.subscription_id = Some("sub_test".to_string());

    let mut unit = store.begin().await.unwrap();
    unit.save_account_billing(&paid).await.unwrap();
    unit.commit().await.unwrap();
}
