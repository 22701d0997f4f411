//! Mobile upload hand-off handlers
//!
//! The desktop opens a session and renders its id as a QR code. The phone
//! posts uploads with nothing but the session id, which acts as the
//! capability. The desktop then takes the uploads once.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use headshot_types::{MobileUpload, NewMobileUpload, UploadSessionId};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AuthUser, OperatorAuth};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadSessionResponse {
    pub session_id: UploadSessionId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TakeUploadsResponse {
    pub uploads: Vec<MobileUpload>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

fn parse_session_id(raw: &str) -> ApiResult<UploadSessionId> {
    UploadSessionId::parse(raw).map_err(|_| ApiError::bad_request("Invalid upload session id"))
}

/// POST /api/v1/mobile-uploads/sessions
pub async fn create_upload_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<(StatusCode, Json<UploadSessionResponse>)> {
    let session = state
        .handoff
        .create_session(state.config.upload_session_ttl)
        .await?;
    tracing::debug!(subject_id = %user.subject_id(), session_id = %session.id, "Hand-off started");

    Ok((
        StatusCode::CREATED,
        Json(UploadSessionResponse {
            session_id: session.id,
            expires_at: session.expires_at,
        }),
    ))
}

/// GET /api/v1/mobile-uploads/sessions/{id}
///
/// Returns the uploads received so far and removes them.
pub async fn take_uploads(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TakeUploadsResponse>> {
    let session_id = parse_session_id(&id)?;
    let uploads = state.handoff.take_uploads(session_id).await?;
    Ok(Json(TakeUploadsResponse { uploads }))
}

/// POST /api/v1/mobile-uploads/sessions/{id}/uploads
pub async fn register_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upload): Json<NewMobileUpload>,
) -> ApiResult<(StatusCode, Json<MobileUpload>)> {
    let session_id = parse_session_id(&id)?;
    let stored = state.handoff.register_upload(session_id, upload).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// POST /internal/mobile-uploads/purge
pub async fn purge_upload_sessions(
    State(state): State<AppState>,
    _operator: OperatorAuth,
) -> ApiResult<Json<PurgeResponse>> {
    let purged = state.handoff.purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}
