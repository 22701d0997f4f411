//! Shared fixtures for billing tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use headshot_billing_core::{
    signature_header, BillingConfig, BillingError, BillingService, PaymentProvider, WebhookOutcome,
};
use headshot_db::{AccountRepository, LedgerRepository, MemoryStore, Repositories};
use headshot_types::{
    Account, AccountId, CheckoutSession, CustomerId, IdempotencyKey, Identity, PlanTier,
    PortalSession, FREE_TIER_CREDITS,
};
use serde_json::{json, Value};

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Provider double that counts calls
#[derive(Debug, Default)]
pub struct MockProvider {
    pub customers_created: AtomicUsize,
    pub checkouts_created: AtomicUsize,
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_customer(
        &self,
        _account_id: AccountId,
        _email: &str,
    ) -> Result<CustomerId, BillingError> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(CustomerId::new(format!("cus_mock_{n}")))
    }

    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        _account_id: AccountId,
        tier: PlanTier,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let n = self.checkouts_created.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSession {
            session_id: format!("cs_{n}"),
            url: format!("https://checkout.test/{customer_id}/{n}"),
            plan_tier: tier,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        Ok(PortalSession {
            url: format!("https://portal.test/{customer_id}?return={return_url}"),
        })
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub provider: Arc<MockProvider>,
    pub billing: BillingService,
}

pub fn config() -> BillingConfig {
    BillingConfig::new("sk_test", WEBHOOK_SECRET)
        .with_price(PlanTier::Basic, "price_basic")
        .with_price(PlanTier::Pro, "price_pro")
        .with_price(PlanTier::Unlimited, "price_unlimited")
}

pub fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let provider = Arc::new(MockProvider::default());
    let billing = BillingService::new(
        Repositories::in_memory(store.clone()),
        provider.clone(),
        config(),
    );
    Fixture {
        store,
        provider,
        billing,
    }
}

impl Fixture {
    /// Signed-in free account without a customer
    pub async fn account(&self, subject: &str) -> Account {
        let identity = Identity {
            subject_id: subject.to_string(),
            email: format!("{subject}@example.com"),
        };
        self.store
            .upsert_by_subject(&identity, FREE_TIER_CREDITS)
            .await
            .unwrap()
            .account
    }

    /// Signed-in free account attached to `customer_id`
    pub async fn customer(&self, subject: &str, customer_id: &str) -> Account {
        let account = self.account(subject).await;
        self.store
            .set_billing_customer(account.id, customer_id)
            .await
            .unwrap();
        self.reload(&account).await
    }

    pub async fn reload(&self, account: &Account) -> Account {
        self.store.find_by_id(account.id).await.unwrap().unwrap()
    }

    /// Consume `count` credits with fresh idempotency keys
    pub async fn spend(&self, account: &Account, count: usize) {
        for n in 0..count {
            let key = IdempotencyKey::parse(format!("spend-{n}")).unwrap();
            let outcome = self.store.consume_credit(account.id, &key).await.unwrap();
            assert!(outcome.granted);
        }
    }

    /// Deliver an event with a valid signature
    pub async fn deliver(&self, event: &Value) -> Result<WebhookOutcome, BillingError> {
        let body = event.to_string();
        let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &body).unwrap();
        self.billing.process_webhook(body.as_bytes(), &header).await
    }
}

fn envelope(id: &str, event_type: &str, created: i64, object: Value) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": created,
        "data": { "object": object }
    })
}

pub fn checkout_completed(
    id: &str,
    customer: &str,
    subscription: &str,
    tier: Option<&str>,
    created: i64,
) -> Value {
    let metadata = match tier {
        Some(tier) => json!({ "plan_tier": tier }),
        None => json!({}),
    };
    envelope(
        id,
        "checkout.session.completed",
        created,
        json!({
            "id": format!("cs_{id}"),
            "customer": customer,
            "subscription": subscription,
            "metadata": metadata
        }),
    )
}

pub fn subscription_event(
    id: &str,
    event_type: &str,
    customer: &str,
    subscription: &str,
    status: &str,
    tier: Option<&str>,
    created: i64,
) -> Value {
    let metadata = match tier {
        Some(tier) => json!({ "plan_tier": tier }),
        None => json!({}),
    };
    envelope(
        id,
        event_type,
        created,
        json!({
            "id": subscription,
            "customer": customer,
            "status": status,
            "current_period_start": created - 60,
            "metadata": metadata
        }),
    )
}

pub fn subscription_deleted(id: &str, customer: &str, subscription: &str, created: i64) -> Value {
    subscription_event(
        id,
        "customer.subscription.deleted",
        customer,
        subscription,
        "canceled",
        None,
        created,
    )
}

pub fn invoice_event(
    id: &str,
    event_type: &str,
    customer: &str,
    subscription: &str,
    tier: Option<&str>,
    created: i64,
) -> Value {
    let details = match tier {
        Some(tier) => json!({ "metadata": { "plan_tier": tier } }),
        None => json!({ "metadata": {} }),
    };
    envelope(
        id,
        event_type,
        created,
        json!({
            "id": format!("in_{id}"),
            "customer": customer,
            "subscription": subscription,
            "period_end": created - 60,
            "subscription_details": details,
            "lines": { "data": [ { "period": { "start": created - 60 } } ] }
        }),
    )
}
