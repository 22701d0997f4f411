//! Mobile-to-desktop upload hand-off types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest photo accepted from a phone (10 MiB)
pub const MAX_UPLOAD_BYTES: i64 = 10 * 1024 * 1024;

/// Most photos one hand-off session accepts, collected or not
pub const MAX_UPLOADS_PER_SESSION: i32 = 10;

/// Default lifetime of a hand-off session, in seconds (48 hours)
pub const DEFAULT_UPLOAD_SESSION_TTL_SECS: i64 = 48 * 60 * 60;

/// Hand-off session identifier. Encoded into the QR code shown on desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadSessionId(pub Uuid);

impl UploadSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UploadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hand-off session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: UploadSessionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Metadata for a photo uploaded from the phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMobileUpload {
    pub file_url: String,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
}

/// A stored upload, waiting for the desktop to collect it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileUpload {
    pub id: Uuid,
    pub session_id: UploadSessionId,
    pub file_url: String,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl MobileUpload {
    pub fn from_new(session_id: UploadSessionId, upload: NewMobileUpload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            file_url: upload.file_url,
            filename: upload.filename,
            original_name: upload.original_name,
            content_type: upload.content_type,
            size_bytes: upload.size_bytes,
            uploaded_at: now,
        }
    }
}
