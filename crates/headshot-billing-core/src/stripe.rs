//! Stripe payment provider implementation

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use headshot_types::{AccountId, CheckoutSession, CustomerId, PlanTier, PortalSession};

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::provider::PaymentProvider;

/// Stripe payment provider
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
    config: BillingConfig,
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(config: BillingConfig) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Make authenticated request to Stripe
    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let url = format!("{}{endpoint}", self.config.api_base);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.stripe_secret_key, Option::<&str>::None)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                // connect failures and timeouts alike
                warn!(error = %e, endpoint, "Stripe API request failed");
                BillingError::ProviderTransient(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, endpoint, "Stripe API error");
            return Err(classify_status(status));
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Stripe response");
            BillingError::ProviderPermanent(format!("unexpected response: {e}"))
        })
    }
}

/// 429 and 5xx may succeed later; any other failure will not
fn classify_status(status: StatusCode) -> BillingError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BillingError::ProviderTransient(format!("Stripe API error: {status}"))
    } else {
        BillingError::ProviderPermanent(format!("Stripe API error: {status}"))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    #[instrument(skip(self, email))]
    async fn create_customer(
        &self,
        account_id: AccountId,
        email: &str,
    ) -> Result<CustomerId, BillingError> {
        debug!("Creating Stripe customer");

        let account = account_id.to_string();
        let form = [("email", email), ("metadata[account_id]", account.as_str())];

        let customer: StripeCustomer = self.stripe_request("/customers", &form).await?;
        Ok(CustomerId::new(customer.id))
    }

    #[instrument(skip(self, success_url, cancel_url))]
    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        account_id: AccountId,
        tier: PlanTier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        debug!("Creating checkout session");

        let price_id = self
            .config
            .get_price_id(tier)
            .ok_or(BillingError::PriceNotConfigured(tier))?;

        let account = account_id.to_string();
        let form = [
            ("customer", customer_id.as_str()),
            ("mode", "subscription"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", account.as_str()),
            ("metadata[account_id]", account.as_str()),
            ("metadata[plan_tier]", tier.as_str()),
            ("subscription_data[metadata][account_id]", account.as_str()),
            ("subscription_data[metadata][plan_tier]", tier.as_str()),
        ];

        let session: StripeCheckoutSession =
            self.stripe_request("/checkout/sessions", &form).await?;

        let url = session.url.ok_or_else(|| {
            BillingError::ProviderPermanent("checkout session has no URL".to_string())
        })?;

        Ok(CheckoutSession {
            session_id: session.id,
            url,
            plan_tier: tier,
        })
    }

    #[instrument(skip(self, return_url))]
    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        debug!("Creating portal session");

        let form = [("customer", customer_id.as_str()), ("return_url", return_url)];

        let session: StripeBillingPortalSession = self
            .stripe_request("/billing_portal/sessions", &form)
            .await?;

        Ok(PortalSession { url: session.url })
    }
}

// Stripe API response types

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeBillingPortalSession {
    url: String,
}
