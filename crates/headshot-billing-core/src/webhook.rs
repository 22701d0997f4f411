//! Stripe webhook handling

use chrono::{DateTime, TimeZone, Utc};
use headshot_types::PlanTier;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, instrument, warn};

use crate::error::BillingError;

/// Default accepted age of a signature timestamp, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Webhook event types we handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    /// Checkout session completed
    CheckoutSessionCompleted,
    /// Customer subscription created
    CustomerSubscriptionCreated,
    /// Customer subscription updated
    CustomerSubscriptionUpdated,
    /// Customer subscription deleted
    CustomerSubscriptionDeleted,
    /// Invoice paid (`invoice.paid` or `invoice.payment_succeeded`)
    InvoicePaid,
    /// Invoice payment failed
    InvoicePaymentFailed,
    /// Unknown event type
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::CustomerSubscriptionCreated,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl WebhookEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CustomerSubscriptionCreated => "customer.subscription.created",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown(other) => other,
        }
    }
}

/// Parsed webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Event ID
    pub id: String,
    /// Event type
    pub event_type: WebhookEventType,
    /// Event data
    pub data: WebhookEventData,
    /// When the provider created the event
    pub created: DateTime<Utc>,
    /// The event body exactly as delivered
    pub payload: String,
}

impl WebhookEvent {
    /// Customer the event refers to, if any
    pub fn customer_id(&self) -> Option<&str> {
        match &self.data {
            WebhookEventData::CheckoutSession(data) => data.customer_id.as_deref(),
            WebhookEventData::Subscription(data) => Some(&data.customer_id),
            WebhookEventData::Invoice(data) => Some(&data.customer_id),
            WebhookEventData::Raw(_) => None,
        }
    }
}

/// Webhook event data
#[derive(Debug, Clone)]
pub enum WebhookEventData {
    /// Checkout session data
    CheckoutSession(CheckoutSessionData),
    /// Subscription data
    Subscription(SubscriptionData),
    /// Invoice data
    Invoice(InvoiceData),
    /// Raw JSON for unknown events
    Raw(serde_json::Value),
}

/// Checkout session completed data
#[derive(Debug, Clone)]
pub struct CheckoutSessionData {
    /// Session ID
    pub session_id: String,
    /// Customer ID
    pub customer_id: Option<String>,
    /// Subscription ID
    pub subscription_id: Option<String>,
    /// Tier from session metadata
    pub plan_tier: Option<PlanTier>,
}

/// Subscription event data
#[derive(Debug, Clone)]
pub struct SubscriptionData {
    /// Subscription ID
    pub subscription_id: String,
    /// Customer ID
    pub customer_id: String,
    /// Provider status (`active`, `past_due`, `unpaid`, ...)
    pub status: String,
    /// Start of the current billing period
    pub period_start: Option<DateTime<Utc>>,
    /// Tier from subscription metadata
    pub plan_tier: Option<PlanTier>,
    /// Price of the first subscription item
    pub price_id: Option<String>,
}

/// Invoice event data
#[derive(Debug, Clone)]
pub struct InvoiceData {
    /// Invoice ID
    pub invoice_id: String,
    /// Customer ID
    pub customer_id: String,
    /// Subscription the invoice bills, if any
    pub subscription_id: Option<String>,
    /// Start of the service period the invoice pays for
    pub period_start: Option<DateTime<Utc>>,
    /// Tier from the subscription metadata copied onto the invoice
    pub plan_tier: Option<PlanTier>,
}

/// Webhook handler for processing Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookHandler {
    /// Create a new webhook handler
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify and parse a webhook payload
    #[instrument(skip(self, payload, signature))]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, BillingError> {
        self.verify_and_parse_at(payload, signature, Utc::now())
    }

    /// [`Self::verify_and_parse`] against an explicit clock
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, BillingError> {
        let body = std::str::from_utf8(payload)
            .map_err(|_| BillingError::MalformedEvent("payload is not UTF-8".to_string()))?;

        self.verify_signature(body, signature, now)?;

        let raw_event: RawStripeEvent = serde_json::from_str(body)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        debug!(event_id = %raw_event.id, event_type = %raw_event.event_type, "Parsed webhook event");

        let event_type = WebhookEventType::from(raw_event.event_type.as_str());
        let data = parse_event_data(&event_type, raw_event.data.object)?;

        Ok(WebhookEvent {
            id: raw_event.id,
            event_type,
            data,
            created: timestamp(raw_event.created)?,
            payload: body.to_string(),
        })
    }

    /// Verify Stripe webhook signature
    fn verify_signature(
        &self,
        body: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        // Parse signature header: t=timestamp,v1=signature[,v1=signature...]
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => candidates.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            warn!("Missing timestamp in webhook signature");
            BillingError::SignatureInvalid("missing timestamp".to_string())
        })?;

        if candidates.is_empty() {
            warn!("Missing v1 signature in webhook signature");
            return Err(BillingError::SignatureInvalid("missing signature".to_string()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| BillingError::SignatureInvalid("invalid timestamp format".to_string()))?;

        let expected = compute_signature(&self.webhook_secret, ts, body)?;
        let matched = candidates
            .iter()
            .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));

        if !matched {
            error!("Webhook signature verification failed");
            return Err(BillingError::SignatureInvalid(
                "signature mismatch".to_string(),
            ));
        }

        let age = now.timestamp() - ts;
        if age.abs() > self.tolerance_secs {
            warn!(timestamp = ts, now = now.timestamp(), "Webhook timestamp outside tolerance");
            return Err(BillingError::SignatureInvalid(
                "timestamp outside tolerance".to_string(),
            ));
        }

        Ok(())
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`, the Stripe `v1` scheme
pub fn compute_signature(secret: &str, timestamp: i64, body: &str) -> Result<String, BillingError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Internal("HMAC error".to_string()))?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Full `Stripe-Signature` header value for a body
pub fn signature_header(secret: &str, timestamp: i64, body: &str) -> Result<String, BillingError> {
    Ok(format!("t={timestamp},v1={}", compute_signature(secret, timestamp, body)?))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, BillingError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| BillingError::MalformedEvent(format!("timestamp out of range: {secs}")))
}

fn optional_timestamp(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, BillingError> {
    secs.map(timestamp).transpose()
}

fn parse_tier(metadata: &Metadata) -> Option<PlanTier> {
    metadata.plan_tier.as_deref().and_then(|tier| tier.parse().ok())
}

/// Parse event data based on type
fn parse_event_data(
    event_type: &WebhookEventType,
    object: serde_json::Value,
) -> Result<WebhookEventData, BillingError> {
    match event_type {
        WebhookEventType::CheckoutSessionCompleted => {
            let session: RawCheckoutSession = serde_json::from_value(object)
                .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
            Ok(WebhookEventData::CheckoutSession(CheckoutSessionData {
                plan_tier: parse_tier(&session.metadata),
                session_id: session.id,
                customer_id: session.customer,
                subscription_id: session.subscription,
            }))
        }
        WebhookEventType::CustomerSubscriptionCreated
        | WebhookEventType::CustomerSubscriptionUpdated
        | WebhookEventType::CustomerSubscriptionDeleted => {
            let sub: RawSubscription = serde_json::from_value(object)
                .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
            let first_item = sub.items.data.first();
            // newer API versions moved the period onto the items
            let period_start = sub
                .current_period_start
                .or_else(|| first_item.and_then(|item| item.current_period_start));
            Ok(WebhookEventData::Subscription(SubscriptionData {
                plan_tier: parse_tier(&sub.metadata),
                price_id: first_item
                    .and_then(|item| item.price.as_ref())
                    .map(|price| price.id.clone()),
                period_start: optional_timestamp(period_start)?,
                subscription_id: sub.id,
                customer_id: sub.customer,
                status: sub.status,
            }))
        }
        WebhookEventType::InvoicePaid | WebhookEventType::InvoicePaymentFailed => {
            let inv: RawInvoice = serde_json::from_value(object)
                .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
            let details = inv
                .subscription_details
                .or_else(|| inv.parent.and_then(|parent| parent.subscription_details));
            let subscription_id = inv
                .subscription
                .or_else(|| details.as_ref().and_then(|d| d.subscription.clone()));
            let plan_tier = details.as_ref().and_then(|d| parse_tier(&d.metadata));
            // the line period is the service period; the invoice period is the previous one
            let period_start = inv
                .lines
                .data
                .first()
                .and_then(|line| line.period.as_ref())
                .map(|period| period.start)
                .or(inv.period_end);
            Ok(WebhookEventData::Invoice(InvoiceData {
                invoice_id: inv.id,
                customer_id: inv.customer,
                subscription_id,
                period_start: optional_timestamp(period_start)?,
                plan_tier,
            }))
        }
        WebhookEventType::Unknown(kind) => {
            info!(event_type = %kind, "Received unknown webhook event type");
            Ok(WebhookEventData::Raw(object))
        }
    }
}

// Raw Stripe event for parsing
#[derive(Debug, Deserialize)]
struct RawStripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    plan_tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: String,
    status: String,
    current_period_start: Option<i64>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    items: RawList<RawSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionItem {
    current_period_start: Option<i64>,
    price: Option<RawPrice>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    customer: String,
    subscription: Option<String>,
    subscription_details: Option<RawSubscriptionDetails>,
    parent: Option<RawInvoiceParent>,
    period_end: Option<i64>,
    #[serde(default)]
    lines: RawList<RawInvoiceLine>,
}

#[derive(Debug, Deserialize)]
struct RawInvoiceParent {
    subscription_details: Option<RawSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct RawSubscriptionDetails {
    subscription: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawInvoiceLine {
    period: Option<RawPeriod>,
}

#[derive(Debug, Deserialize)]
struct RawPeriod {
    start: i64,
}

#[derive(Debug, Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

impl<T> Default for RawList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn event_body(event_type: &str, object: serde_json::Value) -> String {
        json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_700_000_000,
            "data": { "object": object }
        })
        .to_string()
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_100, 0).unwrap()
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let body = event_body("customer.created", json!({"id": "cus_1"}));
        let header = signature_header(SECRET, 1_700_000_050, &body).unwrap();

        let event = WebhookHandler::new(SECRET)
            .verify_and_parse_at(body.as_bytes(), &header, now())
            .unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("customer.created".into())
        );
        assert_eq!(event.payload, body);
    }

    #[test]
    fn test_any_matching_v1_is_enough() {
        let body = event_body("customer.created", json!({}));
        let good = compute_signature(SECRET, 1_700_000_050, &body).unwrap();
        let header = format!("t=1700000050,v1=deadbeef,v1={good}");

        assert!(WebhookHandler::new(SECRET)
            .verify_and_parse_at(body.as_bytes(), &header, now())
            .is_ok());
    }

    #[test]
    fn test_rejects_bad_signatures() {
        let handler = WebhookHandler::new(SECRET);
        let body = event_body("customer.created", json!({}));
        let cases = [
            signature_header("whsec_other", 1_700_000_050, &body).unwrap(),
            "v1=abc".to_string(),
            "t=1700000050".to_string(),
            "t=soon,v1=abc".to_string(),
            String::new(),
        ];

        for header in cases {
            let result = handler.verify_and_parse_at(body.as_bytes(), &header, now());
            assert!(
                matches!(result, Err(BillingError::SignatureInvalid(_))),
                "accepted {header:?}"
            );
        }
    }

    #[test]
    fn test_rejects_tampered_body() {
        let body = event_body("customer.created", json!({}));
        let header = signature_header(SECRET, 1_700_000_050, &body).unwrap();
        let tampered = body.replace("evt_1", "evt_2");

        let result =
            WebhookHandler::new(SECRET).verify_and_parse_at(tampered.as_bytes(), &header, now());
        assert!(matches!(result, Err(BillingError::SignatureInvalid(_))));
    }

    #[test]
    fn test_rejects_replayed_old_signature() {
        let body = event_body("customer.created", json!({}));
        let header = signature_header(SECRET, 1_700_000_100 - 301, &body).unwrap();

        let result = WebhookHandler::new(SECRET).verify_and_parse_at(body.as_bytes(), &header, now());
        assert!(matches!(result, Err(BillingError::SignatureInvalid(_))));
    }

    #[test]
    fn test_signed_garbage_is_malformed() {
        let body = "{\"not\": \"an event\"}";
        let header = signature_header(SECRET, 1_700_000_050, body).unwrap();

        let result = WebhookHandler::new(SECRET).verify_and_parse_at(body.as_bytes(), &header, now());
        assert!(matches!(result, Err(BillingError::MalformedEvent(_))));
    }

    fn parse(event_type: &str, object: serde_json::Value) -> WebhookEvent {
        let body = event_body(event_type, object);
        let header = signature_header(SECRET, 1_700_000_050, &body).unwrap();
        WebhookHandler::new(SECRET)
            .verify_and_parse_at(body.as_bytes(), &header, now())
            .unwrap()
    }

    #[test]
    fn test_parse_checkout_session() {
        let event = parse(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "account_id": "abc", "plan_tier": "pro" }
            }),
        );

        let WebhookEventData::CheckoutSession(data) = &event.data else {
            panic!("expected checkout data, got {:?}", event.data);
        };
        assert_eq!(data.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(data.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(data.plan_tier, Some(PlanTier::Pro));
        assert_eq!(event.customer_id(), Some("cus_1"));
    }

    #[test]
    fn test_parse_subscription_with_item_period() {
        let event = parse(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "metadata": {},
                "items": { "data": [
                    { "current_period_start": 1_699_000_000, "price": { "id": "price_basic" } }
                ]}
            }),
        );

        let WebhookEventData::Subscription(data) = &event.data else {
            panic!("expected subscription data");
        };
        assert_eq!(data.status, "past_due");
        assert_eq!(data.plan_tier, None);
        assert_eq!(data.price_id.as_deref(), Some("price_basic"));
        assert_eq!(data.period_start.map(|t| t.timestamp()), Some(1_699_000_000));
    }

    #[test]
    fn test_parse_invoice_prefers_line_period() {
        let event = parse(
            "invoice.payment_succeeded",
            json!({
                "id": "in_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "period_end": 1_698_000_000,
                "subscription_details": { "metadata": { "plan_tier": "basic" } },
                "lines": { "data": [ { "period": { "start": 1_698_500_000 } } ] }
            }),
        );

        assert_eq!(event.event_type, WebhookEventType::InvoicePaid);
        let WebhookEventData::Invoice(data) = &event.data else {
            panic!("expected invoice data");
        };
        assert_eq!(data.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(data.plan_tier, Some(PlanTier::Basic));
        assert_eq!(data.period_start.map(|t| t.timestamp()), Some(1_698_500_000));
    }

    #[test]
    fn test_parse_invoice_from_parent_details() {
        let event = parse(
            "invoice.payment_failed",
            json!({
                "id": "in_2",
                "customer": "cus_1",
                "period_end": 1_698_000_000,
                "parent": { "subscription_details": { "subscription": "sub_9" } }
            }),
        );

        let WebhookEventData::Invoice(data) = &event.data else {
            panic!("expected invoice data");
        };
        assert_eq!(data.subscription_id.as_deref(), Some("sub_9"));
        assert_eq!(data.period_start.map(|t| t.timestamp()), Some(1_698_000_000));
    }
}
