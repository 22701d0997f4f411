//! Shared handler utilities

use std::time::Instant;

use axum::http::HeaderMap;
use headshot_types::{Account, IdempotencyKey};

use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthUser;
use crate::state::AppState;

/// Header carrying the caller's idempotency key for paid actions
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Read and validate the `Idempotency-Key` header
pub fn idempotency_key(headers: &HeaderMap) -> ApiResult<IdempotencyKey> {
    let raw = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| ApiError::bad_request("Idempotency-Key header is required"))?
        .to_str()
        .map_err(|_| ApiError::bad_request("Idempotency-Key header is not valid ASCII"))?;

    IdempotencyKey::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Account of the authenticated caller. Accounts are created by
/// `POST /api/v1/account/ensure`, never implicitly.
pub async fn current_account(state: &AppState, user: &AuthUser) -> ApiResult<Account> {
    state
        .accounts
        .find_by_subject(user.subject_id())
        .await?
        .ok_or_else(ApiError::account_not_found)
}

/// Record HTTP operation duration with result label.
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "http_request_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}
