//! Headshot generation handler

use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use headshot_imaging::SourceImage;
use headshot_types::StyleId;
use serde::{Deserialize, Serialize};

use super::shared::{current_account, idempotency_key, record_op_duration};
use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthUser;
use crate::state::AppState;

/// Body limit for the generation route: a 10 MiB photo grows by a third
/// when base64 encoded.
pub const HEADSHOT_BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct GenerateHeadshotRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image_base64: String,
    pub mime_type: Option<String>,
    pub style: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateHeadshotResponse {
    pub image_data_url: String,
    pub style: StyleId,
    pub credits_remaining: i64,
}

/// POST /api/v1/headshots
///
/// Spends one credit under the `Idempotency-Key` header, then generates.
/// A failed generation keeps the credit; retrying with the same key does not
/// spend another one. A key whose image was delivered answers 409.
pub async fn generate_headshot(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(req): Json<GenerateHeadshotRequest>,
) -> ApiResult<Json<GenerateHeadshotResponse>> {
    let start = Instant::now();

    let key = idempotency_key(&headers)?;
    let style: StyleId = req
        .style
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown style: {}", req.style)))?;
    let image = SourceImage::from_base64(&req.image_base64, req.mime_type.as_deref())
        .map_err(|_| ApiError::bad_request("image_base64 is not valid base64"))?;

    let account = current_account(&state, &user).await?;

    let result = state
        .studio
        .generate_headshot(account.id, &key, image, style)
        .await;
    record_op_duration("generate_headshot", start, result.is_ok());

    let headshot = result?;
    Ok(Json(GenerateHeadshotResponse {
        image_data_url: headshot.image.to_data_url(),
        style: headshot.style,
        credits_remaining: headshot.credits_remaining,
    }))
}
