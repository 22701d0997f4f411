//! Configuration for the Headshot API service.

use std::time::Duration;

use headshot_billing_core::BillingConfig;
use headshot_imaging::GeminiConfig;
use headshot_types::{PlanTier, DEFAULT_UPLOAD_SESSION_TTL_SECS};

/// Headshot API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Apply migrations on startup
    pub run_migrations: bool,
    /// HS256 secret shared with the identity provider
    pub jwt_secret: String,
    /// Expected `iss` claim, if the identity provider sets one
    pub jwt_issuer: Option<String>,
    /// Bearer secret for operator endpoints
    pub operator_secret: String,
    /// Billing core configuration
    pub billing: BillingConfig,
    /// Image generation configuration
    pub gemini: GeminiConfig,
    /// Bound on one generation, enforced by the studio
    pub generation_timeout: Duration,
    /// Lifetime of a mobile upload session
    pub upload_session_ttl: chrono::Duration,
    /// Request timeout for API routes
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let parsed = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            lookup(key)
                .unwrap_or_else(|| default.to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid(key))
        };

        let database_url = required("DATABASE_URL")?;

        let http_port = lookup("HTTP_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("HTTP_PORT"))?;

        // Identity and operator secrets
        let jwt_secret = required("AUTH_JWT_SECRET")?;
        let jwt_issuer = lookup("AUTH_JWT_ISSUER");
        let operator_secret = required("OPERATOR_SECRET")?;
        if operator_secret.len() < 16 {
            return Err(ConfigError::Invalid("OPERATOR_SECRET"));
        }

        // Stripe configuration
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;
        let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;

        let mut billing = BillingConfig::new(stripe_secret_key, stripe_webhook_secret);
        for (tier, key) in [
            (PlanTier::Basic, "STRIPE_PRICE_BASIC"),
            (PlanTier::Pro, "STRIPE_PRICE_PRO"),
            (PlanTier::Unlimited, "STRIPE_PRICE_UNLIMITED"),
        ] {
            if let Some(price_id) = lookup(key) {
                billing = billing.with_price(tier, price_id);
            }
        }
        if let (Some(success), Some(cancel)) =
            (lookup("BILLING_SUCCESS_URL"), lookup("BILLING_CANCEL_URL"))
        {
            billing = billing.with_urls(success, cancel);
        }
        if let Some(return_url) = lookup("BILLING_PORTAL_RETURN_URL") {
            billing = billing.with_portal_return_url(return_url);
        }
        billing = billing.with_timeout(Duration::from_secs(parsed("STRIPE_TIMEOUT_SECS", "10")?));

        // Image generation
        let mut gemini = GeminiConfig::new(required("GEMINI_API_KEY")?);
        if let Some(model) = lookup("GEMINI_MODEL") {
            gemini = gemini.with_model(model);
        }
        let generation_timeout = Duration::from_secs(parsed("GENERATION_TIMEOUT_SECS", "90")?);
        gemini = gemini.with_timeout(generation_timeout);

        let ttl_secs = parsed(
            "UPLOAD_SESSION_TTL_SECS",
            &DEFAULT_UPLOAD_SESSION_TTL_SECS.to_string(),
        )?;
        let upload_session_ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or(ConfigError::Invalid("UPLOAD_SESSION_TTL_SECS"))?;

        // Request timeout must leave room for a full generation
        let request_timeout = Duration::from_secs(parsed("REQUEST_TIMEOUT_SECS", "120")?);
        if request_timeout <= generation_timeout {
            return Err(ConfigError::Invalid("REQUEST_TIMEOUT_SECS"));
        }

        let metrics_enabled = lookup("METRICS_ENABLED")
            .map(|v| v.parse().unwrap_or(true))
            .unwrap_or(true);
        let run_migrations = lookup("RUN_MIGRATIONS")
            .map(|v| v.parse().unwrap_or(true))
            .unwrap_or(true);

        Ok(Self {
            http_port,
            database_url,
            run_migrations,
            jwt_secret,
            jwt_issuer,
            operator_secret,
            billing,
            gemini,
            generation_timeout,
            upload_session_ttl,
            request_timeout,
            metrics_enabled,
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/headshot"),
        ("AUTH_JWT_SECRET", "jwt-secret"),
        ("OPERATOR_SECRET", "operator-secret-0123"),
        ("STRIPE_SECRET_KEY", "sk_test"),
        ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
        ("GEMINI_API_KEY", "gemini-key"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(env(MINIMAL)).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.generation_timeout, Duration::from_secs(90));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.upload_session_ttl, chrono::Duration::hours(48));
        assert!(config.metrics_enabled);
        assert!(config.billing.price_ids.is_empty());
    }

    #[test]
    fn test_prices_and_urls() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("STRIPE_PRICE_PRO", "price_pro"),
            ("BILLING_SUCCESS_URL", "https://app.test/ok"),
            ("BILLING_CANCEL_URL", "https://app.test/no"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.billing.get_price_id(PlanTier::Pro), Some("price_pro"));
        assert_eq!(config.billing.get_price_id(PlanTier::Basic), None);
        assert_eq!(config.billing.success_url, "https://app.test/ok");
    }

    #[test]
    fn test_missing_and_invalid() {
        let without_db: Vec<_> = MINIMAL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DATABASE_URL")
            .collect();
        assert!(matches!(
            Config::from_lookup(env(&without_db)),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("HTTP_PORT", "eighty"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid("HTTP_PORT"))
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("REQUEST_TIMEOUT_SECS", "30"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid("REQUEST_TIMEOUT_SECS"))
        ));
    }
}
