//! Billing configuration

use std::collections::HashMap;
use std::time::Duration;

use headshot_types::PlanTier;

/// Default Stripe API base URL
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Billing service configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// Map of tiers to Stripe price IDs
    pub price_ids: HashMap<PlanTier, String>,
    /// Success URL for checkout
    pub success_url: String,
    /// Cancel URL for checkout
    pub cancel_url: String,
    /// Where the billing portal sends the customer back to
    pub portal_return_url: String,
    /// Stripe API base URL
    pub api_base: String,
    /// Timeout for every call to Stripe
    pub request_timeout: Duration,
    /// Accepted clock skew for webhook signatures, in seconds
    pub signature_tolerance_secs: i64,
}

impl BillingConfig {
    /// Create a new billing config
    pub fn new(
        stripe_secret_key: impl Into<String>,
        stripe_webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            stripe_secret_key: stripe_secret_key.into(),
            stripe_webhook_secret: stripe_webhook_secret.into(),
            price_ids: HashMap::new(),
            success_url: "http://localhost:3000/dashboard?checkout=success".to_string(),
            cancel_url: "http://localhost:3000/pricing?checkout=cancelled".to_string(),
            portal_return_url: "http://localhost:3000/dashboard".to_string(),
            api_base: STRIPE_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
            signature_tolerance_secs: 300,
        }
    }

    /// Set price ID for a tier
    pub fn with_price(mut self, tier: PlanTier, price_id: impl Into<String>) -> Self {
        self.price_ids.insert(tier, price_id.into());
        self
    }

    /// Set checkout URLs
    pub fn with_urls(
        mut self,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    pub fn with_portal_return_url(mut self, url: impl Into<String>) -> Self {
        self.portal_return_url = url.into();
        self
    }

    /// Point the Stripe client somewhere else (tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get price ID for a tier
    pub fn get_price_id(&self, tier: PlanTier) -> Option<&str> {
        self.price_ids.get(&tier).map(String::as_str)
    }

    /// Reverse lookup of a configured price
    pub fn tier_for_price(&self, price_id: &str) -> Option<PlanTier> {
        self.price_ids
            .iter()
            .find(|(_, configured)| configured.as_str() == price_id)
            .map(|(tier, _)| *tier)
    }
}
