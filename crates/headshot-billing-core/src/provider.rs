//! Payment provider abstraction

use async_trait::async_trait;

use headshot_types::{AccountId, CheckoutSession, CustomerId, PlanTier, PortalSession};

use crate::BillingError;

/// Payment provider trait
///
/// Abstracts payment processing to allow different providers (Stripe, etc.)
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer for an account. The account ID travels as metadata.
    async fn create_customer(
        &self,
        account_id: AccountId,
        email: &str,
    ) -> Result<CustomerId, BillingError>;

    /// Create a subscription checkout session for `tier`.
    ///
    /// The session and the subscription it creates carry the account ID and
    /// tier as metadata so that webhook events can be attributed.
    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        account_id: AccountId,
        tier: PlanTier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError>;

    /// Create a customer portal session
    async fn create_portal_session(
        &self,
        customer_id: &CustomerId,
        return_url: &str,
    ) -> Result<PortalSession, BillingError>;
}
