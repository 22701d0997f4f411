//! Billing errors

use headshot_types::PlanTier;
use thiserror::Error;

/// Billing errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Webhook signature missing, malformed, wrong or outside the tolerance
    #[error("webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Signed payload that is not a usable event
    #[error("malformed webhook event: {0}")]
    MalformedEvent(String),

    /// Account not found
    #[error("account not found")]
    AccountNotFound,

    /// Account has no payment-provider customer yet
    #[error("customer not found")]
    CustomerNotFound,

    /// No price configured for the tier
    #[error("no price configured for tier {0}")]
    PriceNotConfigured(PlanTier),

    /// Provider unreachable, timed out, rate limited or failing; worth retrying
    #[error("payment provider unavailable: {0}")]
    ProviderTransient(String),

    /// Provider rejected the request
    #[error("payment provider rejected request: {0}")]
    ProviderPermanent(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] headshot_db::DbError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AccountNotFound | Self::CustomerNotFound)
    }

    /// Check if this is a provider error
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::ProviderTransient(_) | Self::ProviderPermanent(_))
    }

    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_) | Self::Database(_))
    }

    /// Whether the request was rejected before anything was applied
    pub fn is_bad_webhook(&self) -> bool {
        matches!(self, Self::SignatureInvalid(_) | Self::MalformedEvent(_))
    }
}
