//! Checkout and billing portal handlers

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use headshot_types::PlanTier;
use serde::{Deserialize, Serialize};

use super::shared::{current_account, record_op_duration};
use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_tier: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
    pub plan_tier: PlanTier,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// POST /api/v1/billing/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let start = Instant::now();

    let tier: PlanTier = req
        .plan_tier
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown plan tier: {}", req.plan_tier)))?;
    let account = current_account(&state, &user).await?;

    let result = state.billing.start_checkout(account.id, tier).await;
    record_op_duration("create_checkout", start, result.is_ok());

    let session = result?;
    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
        plan_tier: session.plan_tier,
    }))
}

/// POST /api/v1/billing/portal
pub async fn create_portal(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PortalResponse>> {
    let start = Instant::now();
    let account = current_account(&state, &user).await?;

    let result = state.billing.open_billing_portal(account.id).await;
    record_op_duration("create_portal", start, result.is_ok());

    Ok(Json(PortalResponse { url: result?.url }))
}
