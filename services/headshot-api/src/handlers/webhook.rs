//! Stripe webhook handler

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

/// POST /webhooks/stripe
///
/// Every verified event is acknowledged with 200, including duplicates,
/// stale events and events queued for reconciliation. Bad signatures get a
/// 400 and nothing is stored; storage failures get a 500 so Stripe retries.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let Some(sig_header) = headers.get("stripe-signature") else {
        tracing::warn!("Missing Stripe-Signature header");
        return Err(ApiError::bad_request("Missing Stripe-Signature header"));
    };

    let Ok(signature) = sig_header.to_str() else {
        tracing::warn!("Invalid Stripe-Signature header encoding");
        return Err(ApiError::bad_request("Invalid Stripe-Signature header"));
    };

    match state.billing.process_webhook(&body, signature).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            received: true,
            outcome: outcome.as_str(),
        })),
        Err(e) => {
            if e.is_bad_webhook() {
                tracing::warn!(error = %e, "Webhook rejected");
            } else {
                tracing::error!(error = ?e, "Webhook processing failed");
            }
            Err(e.into())
        }
    }
}
