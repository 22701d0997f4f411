//! Headshot Billing Core - Subscription billing
//!
//! Stripe checkout and portal sessions, webhook verification and the
//! subscription state machine that keeps accounts in step with the provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use headshot_billing_core::{BillingConfig, BillingService, StripeProvider};
//! use headshot_types::PlanTier;
//!
//! let config = BillingConfig::new("sk_test_...", "whsec_...")
//!     .with_price(PlanTier::Pro, "price_...");
//! let provider = Arc::new(StripeProvider::new(config.clone())?);
//! let billing = BillingService::new(repos, provider, config);
//!
//! let session = billing.start_checkout(account_id, PlanTier::Pro).await?;
//! let outcome = billing.process_webhook(&body, signature).await?;
//! ```

pub mod config;
pub mod error;
pub mod machine;
pub mod provider;
pub mod service;
pub mod stripe;
pub mod webhook;

pub use config::BillingConfig;
pub use error::BillingError;
pub use machine::{decide, BillingEvent, Decision, EventKind, Transition};
pub use provider::PaymentProvider;
pub use service::{BillingService, WebhookOutcome};
pub use stripe::StripeProvider;
pub use webhook::{
    compute_signature, signature_header, WebhookEvent, WebhookEventData, WebhookEventType,
    WebhookHandler,
};

// Re-export checkout types for convenience
pub use headshot_types::{CheckoutSession, PortalSession};
