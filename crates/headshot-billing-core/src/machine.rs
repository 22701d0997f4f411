//! Subscription state machine
//!
//! Provider events arrive at least once and in any order. Each event is
//! reduced to a [`BillingEvent`] and then [`decide`]d against the locked
//! account and the cursor of the subscription it concerns. The decision is
//! pure; the service applies it inside one unit of work.
//!
//! Ordering rules:
//! - an event older than the newest applied event of its subscription is stale
//! - nothing is applied to a subscription after it ended
//! - a subscription other than the account's current one is adopted only by
//!   an event that proves payment and names a tier
//! - delinquency of a subscription not yet adopted is kept on its cursor, so
//!   the older payment that adopts it lands past due

use chrono::{DateTime, Utc};
use headshot_db::SubscriptionCursor;
use headshot_types::{
    Account, CreditGrant, Plan, PlanTier, SubscriptionStatus, FREE_TIER_CREDITS,
};

use crate::config::BillingConfig;
use crate::webhook::{WebhookEvent, WebhookEventData, WebhookEventType};

/// What a provider event means for the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Hosted checkout finished
    CheckoutCompleted,
    /// Subscription created or updated into `active` or `trialing`
    SubscriptionActive,
    /// Subscription created or updated into `past_due` or `unpaid`
    SubscriptionDelinquent,
    /// Subscription in a state that changes nothing here (`incomplete`, `paused`)
    SubscriptionPending,
    /// Subscription deleted, or updated into `canceled`/`incomplete_expired`
    SubscriptionEnded,
    InvoicePaid,
    PaymentFailed,
}

impl EventKind {
    fn from_subscription_status(status: &str) -> Self {
        match status {
            "active" | "trialing" => Self::SubscriptionActive,
            "past_due" | "unpaid" => Self::SubscriptionDelinquent,
            "canceled" | "incomplete_expired" => Self::SubscriptionEnded,
            _ => Self::SubscriptionPending,
        }
    }

    /// Whether the event is evidence of a successful payment
    fn proves_payment(self) -> bool {
        matches!(
            self,
            Self::CheckoutCompleted | Self::SubscriptionActive | Self::InvoicePaid
        )
    }
}

/// A provider event reduced to what the state machine needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    pub kind: EventKind,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Tier from metadata, or from the configured price of the subscription
    pub plan_tier: Option<PlanTier>,
    /// Start of the billing period this event pays for
    pub period_start: Option<DateTime<Utc>>,
    /// Provider creation time of the event
    pub created: DateTime<Utc>,
}

impl BillingEvent {
    /// Reduce a verified webhook event. Returns `None` for event types that
    /// carry no billing meaning.
    pub fn from_webhook(event: &WebhookEvent, config: &BillingConfig) -> Option<Self> {
        let created = event.created;
        let reduced = match &event.data {
            WebhookEventData::CheckoutSession(data) => Self {
                kind: EventKind::CheckoutCompleted,
                customer_id: data.customer_id.clone(),
                subscription_id: data.subscription_id.clone(),
                plan_tier: data.plan_tier,
                period_start: None,
                created,
            },
            WebhookEventData::Subscription(data) => {
                let kind = if event.event_type == WebhookEventType::CustomerSubscriptionDeleted {
                    EventKind::SubscriptionEnded
                } else {
                    EventKind::from_subscription_status(&data.status)
                };
                Self {
                    kind,
                    customer_id: Some(data.customer_id.clone()),
                    subscription_id: Some(data.subscription_id.clone()),
                    plan_tier: data.plan_tier.or_else(|| {
                        data.price_id
                            .as_deref()
                            .and_then(|price| config.tier_for_price(price))
                    }),
                    period_start: data.period_start,
                    created,
                }
            }
            WebhookEventData::Invoice(data) => Self {
                kind: if event.event_type == WebhookEventType::InvoicePaid {
                    EventKind::InvoicePaid
                } else {
                    EventKind::PaymentFailed
                },
                customer_id: Some(data.customer_id.clone()),
                subscription_id: data.subscription_id.clone(),
                plan_tier: data.plan_tier,
                period_start: data.period_start,
                created,
            },
            WebhookEventData::Raw(_) => return None,
        };
        Some(reduced)
    }

    /// Subscription the event applies to for `account`.
    ///
    /// Invoices without a subscription reference bill the current one.
    pub fn target_subscription<'a>(&'a self, account: &'a Account) -> Option<&'a str> {
        match (&self.subscription_id, self.kind) {
            (Some(id), _) => Some(id.as_str()),
            (None, EventKind::InvoicePaid | EventKind::PaymentFailed) => {
                account.subscription_id.as_deref()
            }
            (None, _) => None,
        }
    }
}

/// Changes to persist for one event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Account with its billing fields updated; credits are left to `grant`
    pub account: Account,
    pub grant: Option<CreditGrant>,
    pub cursor: SubscriptionCursor,
}

/// Result of evaluating one event
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply(Transition),
    /// Superseded by an event already applied
    Stale(&'static str),
    /// Nothing to do
    Ignore(&'static str),
    /// Cannot be applied without a human
    Reconcile(&'static str),
}

/// Evaluate `event` against `account` and the cursor of the target subscription
pub fn decide(
    event: &BillingEvent,
    account: &Account,
    cursor: Option<&SubscriptionCursor>,
) -> Decision {
    let Some(subscription_id) = event.target_subscription(account) else {
        return Decision::Ignore("event names no subscription");
    };

    if event.kind == EventKind::CheckoutCompleted && event.plan_tier.is_none() {
        return Decision::Reconcile("checkout without plan tier");
    }
    if event.kind == EventKind::SubscriptionPending {
        return Decision::Ignore("subscription not yet paid");
    }

    // set when an older payment adopts a subscription first seen as delinquent
    let mut recorded_past_due = None;
    if let Some(cursor) = cursor {
        if cursor.ended {
            return Decision::Stale("subscription already ended");
        }
        if event.created < cursor.last_event_at {
            let adopting = event.kind.proves_payment() && event.plan_tier.is_some();
            if cursor.adopted || !adopting {
                return Decision::Stale("older than last applied event");
            }
            recorded_past_due = Some(cursor.past_due);
        }
    }

    let is_current = account.subscription_id.as_deref() == Some(subscription_id)
        && account.subscription_status.has_subscription();

    let mut next = account.clone();
    let mut grant = None;
    let mut ended = false;

    if !is_current {
        match event.kind {
            EventKind::SubscriptionEnded => {
                // never the live one; remember it ended so late events stay stale
                ended = true;
                if !account.subscription_status.has_subscription() {
                    cancel(&mut next);
                    grant = Some(free_grant(event));
                }
            }
            kind if kind.proves_payment() && event.plan_tier.is_some() => {
                adopt(&mut next, subscription_id, event.plan_tier);
                if recorded_past_due == Some(true) {
                    next.subscription_status = SubscriptionStatus::PastDue;
                }
                grant = period_grant(event, next.plan_tier, kind);
            }
            EventKind::SubscriptionDelinquent | EventKind::PaymentFailed => {
                // account untouched; the cursor keeps the status for the
                // payment event still in flight
            }
            _ => return Decision::Stale("not the account's current subscription"),
        }
    } else {
        match event.kind {
            EventKind::CheckoutCompleted
            | EventKind::SubscriptionActive
            | EventKind::InvoicePaid => {
                adopt(&mut next, subscription_id, event.plan_tier.or(account.plan_tier));
                grant = period_grant(event, next.plan_tier, event.kind);
            }
            EventKind::SubscriptionDelinquent | EventKind::PaymentFailed => {
                next.subscription_status = SubscriptionStatus::PastDue;
            }
            EventKind::SubscriptionEnded => {
                ended = true;
                cancel(&mut next);
                grant = Some(free_grant(event));
            }
            EventKind::SubscriptionPending => {
                return Decision::Ignore("subscription not yet paid");
            }
        }
    }

    let last_event_at = cursor
        .map(|c| c.last_event_at.max(event.created))
        .unwrap_or(event.created);
    let past_due = recorded_past_due.unwrap_or(matches!(
        event.kind,
        EventKind::SubscriptionDelinquent | EventKind::PaymentFailed
    ));
    let adopted = is_current
        || next.subscription_id.as_deref() == Some(subscription_id)
        || cursor.is_some_and(|c| c.adopted);

    Decision::Apply(Transition {
        account: next,
        grant,
        cursor: SubscriptionCursor {
            subscription_id: subscription_id.to_string(),
            account_id: account.id.0,
            last_event_at,
            ended,
            past_due,
            adopted,
        },
    })
}

fn cancel(account: &mut Account) {
    account.plan = Plan::Free;
    account.plan_tier = None;
    account.subscription_status = SubscriptionStatus::Cancelled;
    account.subscription_id = None;
}

fn free_grant(event: &BillingEvent) -> CreditGrant {
    CreditGrant {
        amount: FREE_TIER_CREDITS,
        period_marker: event.created,
    }
}

fn adopt(account: &mut Account, subscription_id: &str, tier: Option<PlanTier>) {
    account.plan = Plan::Paid;
    account.plan_tier = tier;
    account.subscription_status = SubscriptionStatus::Active;
    account.subscription_id = Some(subscription_id.to_string());
}

/// Monthly allotment for the period the event pays for
fn period_grant(event: &BillingEvent, tier: Option<PlanTier>, kind: EventKind) -> Option<CreditGrant> {
    let tier = tier?;
    let period_marker = match kind {
        EventKind::CheckoutCompleted => event.created,
        _ => event.period_start.unwrap_or(event.created),
    };
    Some(CreditGrant {
        amount: tier.monthly_credits(),
        period_marker,
    })
}
