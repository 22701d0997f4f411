//! Billing service

use std::sync::Arc;
use std::time::Instant;

use headshot_db::{BillingUnitOfWork, ReconciliationItem, Repositories};
use headshot_types::{AccountId, CheckoutSession, CustomerId, PlanTier, PortalSession};
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::machine::{decide, BillingEvent, Decision};
use crate::provider::PaymentProvider;
use crate::webhook::{WebhookEvent, WebhookHandler};

/// How a delivered webhook event was handled. Every variant is acknowledged
/// to the provider with a 2xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The account changed
    Applied,
    /// The event id was processed before
    Duplicate,
    /// A newer event for the same subscription was already applied
    Stale,
    /// Not relevant to billing state
    Ignored,
    /// Queued for manual reconciliation
    Reconciliation,
}

impl WebhookOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
            Self::Ignored => "ignored",
            Self::Reconciliation => "reconciliation",
        }
    }
}

impl std::fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing service
#[derive(Clone)]
pub struct BillingService {
    repos: Repositories,
    provider: Arc<dyn PaymentProvider>,
    webhook: WebhookHandler,
    config: Arc<BillingConfig>,
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("webhook", &self.webhook)
            .finish_non_exhaustive()
    }
}

impl BillingService {
    /// Create a new billing service
    pub fn new(
        repos: Repositories,
        provider: Arc<dyn PaymentProvider>,
        config: BillingConfig,
    ) -> Self {
        let webhook = WebhookHandler::new(config.stripe_webhook_secret.clone())
            .with_tolerance(config.signature_tolerance_secs);
        Self {
            repos,
            provider,
            webhook,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Verify a raw webhook delivery and apply it.
    ///
    /// Signature and parse failures are returned before anything is stored.
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, BillingError> {
        let start = Instant::now();

        let result = match self.webhook.verify_and_parse(payload, signature) {
            Ok(event) => self.apply_event(&event).await,
            Err(e) => Err(e),
        };

        histogram!("billing_operation_duration_seconds", "operation" => "webhook")
            .record(start.elapsed().as_secs_f64());
        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(e) if e.is_bad_webhook() => "rejected",
            Err(_) => "error",
        };
        counter!("billing_webhooks_processed_total", "outcome" => label).increment(1);

        result
    }

    /// Apply one verified event in a single unit of work
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type.as_str()))]
    pub async fn apply_event(&self, event: &WebhookEvent) -> Result<WebhookOutcome, BillingError> {
        let mut unit = self.repos.billing.begin().await?;

        if !unit.record_event(&event.id, event.event_type.as_str()).await? {
            debug!("Event already processed");
            // dropping the unit rolls it back
            return Ok(WebhookOutcome::Duplicate);
        }

        let Some(billing_event) = BillingEvent::from_webhook(event, &self.config) else {
            return finish(unit, &event.id, WebhookOutcome::Ignored).await;
        };

        let Some(customer_id) = billing_event.customer_id.as_deref() else {
            return reconcile(unit, event, None, "event has no customer").await;
        };

        let Some(account) = unit.lock_account_by_customer(customer_id).await? else {
            return reconcile(unit, event, Some(customer_id), "no account for customer").await;
        };

        let cursor = match billing_event.target_subscription(&account) {
            Some(subscription_id) => unit.subscription_cursor(subscription_id).await?,
            None => None,
        };

        match decide(&billing_event, &account, cursor.as_ref()) {
            Decision::Apply(transition) => {
                unit.save_account_billing(&transition.account).await?;
                if let Some(grant) = transition.grant {
                    let granted = unit.grant_credits(account.id, grant).await?;
                    debug!(
                        applied = granted.was_applied(),
                        credits = granted.credits(),
                        "Credit grant evaluated"
                    );
                }
                unit.save_subscription_cursor(&transition.cursor).await?;

                info!(
                    account_id = %account.id,
                    plan = %transition.account.plan,
                    status = transition.account.subscription_status.as_str(),
                    "Billing event applied"
                );
                finish(unit, &event.id, WebhookOutcome::Applied).await
            }
            Decision::Stale(reason) => {
                info!(account_id = %account.id, reason, "Stale billing event skipped");
                finish(unit, &event.id, WebhookOutcome::Stale).await
            }
            Decision::Ignore(reason) => {
                debug!(reason, "Billing event ignored");
                finish(unit, &event.id, WebhookOutcome::Ignored).await
            }
            Decision::Reconcile(reason) => reconcile(unit, event, Some(customer_id), reason).await,
        }
    }

    /// Start a subscription checkout and return the hosted session
    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        account_id: AccountId,
        tier: PlanTier,
    ) -> Result<CheckoutSession, BillingError> {
        let start = Instant::now();

        if self.config.get_price_id(tier).is_none() {
            return Err(BillingError::PriceNotConfigured(tier));
        }

        let account = self
            .repos
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(BillingError::AccountNotFound)?;

        let customer_id = match account.billing_customer_id {
            Some(existing) => CustomerId::new(existing),
            None => {
                let created = self
                    .provider
                    .create_customer(account.id, &account.email)
                    .await?;
                let stored = self
                    .repos
                    .accounts
                    .set_billing_customer(account.id, created.as_str())
                    .await?;
                if stored != created.as_str() {
                    // a concurrent checkout attached its customer first
                    warn!(unused_customer = %created, "Customer created twice, keeping the stored one");
                }
                CustomerId::new(stored)
            }
        };

        let session = self
            .provider
            .create_checkout_session(
                &customer_id,
                account.id,
                tier,
                &self.config.success_url,
                &self.config.cancel_url,
            )
            .await?;

        histogram!("billing_operation_duration_seconds", "operation" => "checkout")
            .record(start.elapsed().as_secs_f64());
        info!(session_id = %session.session_id, "Checkout session created");

        Ok(session)
    }

    /// Open the provider's self-service billing portal
    #[instrument(skip(self))]
    pub async fn open_billing_portal(
        &self,
        account_id: AccountId,
    ) -> Result<PortalSession, BillingError> {
        let account = self
            .repos
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(BillingError::AccountNotFound)?;

        let customer_id = account
            .billing_customer_id
            .map(CustomerId::new)
            .ok_or(BillingError::CustomerNotFound)?;

        self.provider
            .create_portal_session(&customer_id, &self.config.portal_return_url)
            .await
    }
}

async fn finish(
    mut unit: Box<dyn BillingUnitOfWork>,
    event_id: &str,
    outcome: WebhookOutcome,
) -> Result<WebhookOutcome, BillingError> {
    unit.record_outcome(event_id, outcome.as_str()).await?;
    unit.commit().await?;
    Ok(outcome)
}

async fn reconcile(
    mut unit: Box<dyn BillingUnitOfWork>,
    event: &WebhookEvent,
    customer_id: Option<&str>,
    reason: &str,
) -> Result<WebhookOutcome, BillingError> {
    warn!(customer_id, reason, "Billing event queued for reconciliation");

    unit.queue_reconciliation(&ReconciliationItem {
        id: Uuid::new_v4(),
        event_id: event.id.clone(),
        event_type: event.event_type.as_str().to_string(),
        customer_id: customer_id.map(str::to_string),
        reason: reason.to_string(),
        payload: event.payload.clone(),
    })
    .await?;

    finish(unit, &event.id, WebhookOutcome::Reconciliation).await
}
