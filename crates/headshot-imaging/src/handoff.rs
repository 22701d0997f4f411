//! Phone-to-desktop photo hand-off
//!
//! The desktop opens a session and shows its id as a QR code. The phone
//! registers uploads against the id until the session expires or holds
//! `MAX_UPLOADS_PER_SESSION` photos, and the desktop collects them exactly once.

use std::sync::Arc;

use chrono::{Duration, Utc};
use headshot_db::{DbError, MobileUploadRepository, UploadInsert};
use headshot_types::{
    MobileUpload, NewMobileUpload, UploadSession, UploadSessionId,
    DEFAULT_UPLOAD_SESSION_TTL_SECS, MAX_UPLOADS_PER_SESSION, MAX_UPLOAD_BYTES,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Hand-off errors
#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("upload session not found")]
    SessionNotFound,

    #[error("upload session expired")]
    SessionExpired,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("file too large: {0} bytes")]
    TooLarge(i64),

    #[error("upload session already holds {MAX_UPLOADS_PER_SESSION} uploads")]
    TooManyUploads,

    #[error("invalid upload: {0}")]
    InvalidUpload(&'static str),

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Upload hand-off service
#[derive(Clone)]
pub struct MobileHandoff {
    uploads: Arc<dyn MobileUploadRepository>,
}

impl MobileHandoff {
    pub fn new(uploads: Arc<dyn MobileUploadRepository>) -> Self {
        Self { uploads }
    }

    /// Lifetime of a session when the caller does not choose one
    pub fn default_ttl() -> Duration {
        Duration::seconds(DEFAULT_UPLOAD_SESSION_TTL_SECS)
    }

    #[instrument(skip(self))]
    pub async fn create_session(&self, ttl: Duration) -> Result<UploadSession, HandoffError> {
        let now = Utc::now();
        let session = UploadSession {
            id: UploadSessionId::new(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.uploads.create_session(&session).await?;
        info!(session_id = %session.id, expires_at = %session.expires_at, "Upload session created");
        Ok(session)
    }

    /// Store an upload from the phone against a live session
    #[instrument(skip(self, upload), fields(session_id = %session_id, size = upload.size_bytes))]
    pub async fn register_upload(
        &self,
        session_id: UploadSessionId,
        upload: NewMobileUpload,
    ) -> Result<MobileUpload, HandoffError> {
        validate(&upload)?;

        let now = Utc::now();
        let session = self
            .uploads
            .find_session(session_id)
            .await?
            .ok_or(HandoffError::SessionNotFound)?;
        if session.is_expired(now) {
            return Err(HandoffError::SessionExpired);
        }

        let stored = MobileUpload::from_new(session_id, upload, now);
        // the session may expire or be purged between the read and the insert
        match self.uploads.insert_upload(&stored, now).await? {
            UploadInsert::Stored => {}
            UploadInsert::SessionClosed => return Err(HandoffError::SessionExpired),
            UploadInsert::SessionFull => {
                warn!("Upload rejected, session is full");
                return Err(HandoffError::TooManyUploads);
            }
        }

        debug!(upload_id = %stored.id, "Upload registered");
        Ok(stored)
    }

    /// Collect every upload of the session. Each upload is returned once.
    #[instrument(skip(self))]
    pub async fn take_uploads(
        &self,
        session_id: UploadSessionId,
    ) -> Result<Vec<MobileUpload>, HandoffError> {
        let session = self
            .uploads
            .find_session(session_id)
            .await?
            .ok_or(HandoffError::SessionNotFound)?;
        if session.is_expired(Utc::now()) {
            return Err(HandoffError::SessionExpired);
        }
        Ok(self.uploads.take_uploads(session_id).await?)
    }

    /// Delete expired sessions and their uploads
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, HandoffError> {
        let purged = self.uploads.purge_expired(Utc::now()).await?;
        info!(purged, "Expired upload sessions purged");
        metrics::counter!("headshot_upload_sessions_purged_total").increment(purged);
        Ok(purged)
    }
}

fn validate(upload: &NewMobileUpload) -> Result<(), HandoffError> {
    if upload.file_url.trim().is_empty() {
        return Err(HandoffError::InvalidUpload("file_url is required"));
    }
    if upload.filename.trim().is_empty() {
        return Err(HandoffError::InvalidUpload("filename is required"));
    }
    if !upload.content_type.starts_with("image/") {
        return Err(HandoffError::UnsupportedContentType(upload.content_type.clone()));
    }
    if upload.size_bytes <= 0 {
        return Err(HandoffError::InvalidUpload("file is empty"));
    }
    if upload.size_bytes > MAX_UPLOAD_BYTES {
        return Err(HandoffError::TooLarge(upload.size_bytes));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use headshot_db::MemoryStore;

    use super::*;

    fn handoff() -> MobileHandoff {
        MobileHandoff::new(Arc::new(MemoryStore::new()))
    }

    fn photo(name: &str) -> NewMobileUpload {
        NewMobileUpload {
            file_url: format!("https://files.test/{name}"),
            filename: name.to_string(),
            original_name: format!("IMG_{name}"),
            content_type: "image/jpeg".to_string(),
            size_bytes: 2048,
        }
    }

    #[tokio::test]
    async fn test_uploads_are_taken_once() {
        let handoff = handoff();
        let session = handoff.create_session(MobileHandoff::default_ttl()).await.unwrap();

        handoff.register_upload(session.id, photo("a.jpg")).await.unwrap();
        handoff.register_upload(session.id, photo("b.jpg")).await.unwrap();

        let taken = handoff.take_uploads(session.id).await.unwrap();
        let names: Vec<_> = taken.iter().map(|u| u.filename.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg"]);

        assert!(handoff.take_uploads(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_stops_accepting_when_full() {
        let handoff = handoff();
        let session = handoff.create_session(MobileHandoff::default_ttl()).await.unwrap();

        for n in 0..MAX_UPLOADS_PER_SESSION {
            handoff
                .register_upload(session.id, photo(&format!("{n}.jpg")))
                .await
                .unwrap();
        }
        assert!(matches!(
            handoff.register_upload(session.id, photo("extra.jpg")).await,
            Err(HandoffError::TooManyUploads)
        ));

        let taken = handoff.take_uploads(session.id).await.unwrap();
        assert_eq!(taken.len(), MAX_UPLOADS_PER_SESSION as usize);
        assert!(matches!(
            handoff.register_upload(session.id, photo("again.jpg")).await,
            Err(HandoffError::TooManyUploads)
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let handoff = handoff();
        let missing = UploadSessionId::new();
        assert!(matches!(
            handoff.register_upload(missing, photo("a.jpg")).await,
            Err(HandoffError::SessionNotFound)
        ));
        assert!(matches!(
            handoff.take_uploads(missing).await,
            Err(HandoffError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejects_uploads_and_is_purged() {
        let handoff = handoff();
        let session = handoff.create_session(Duration::seconds(-1)).await.unwrap();

        assert!(matches!(
            handoff.register_upload(session.id, photo("a.jpg")).await,
            Err(HandoffError::SessionExpired)
        ));
        assert_eq!(handoff.purge_expired().await.unwrap(), 1);
        assert!(matches!(
            handoff.take_uploads(session.id).await,
            Err(HandoffError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let handoff = handoff();
        let session = handoff.create_session(MobileHandoff::default_ttl()).await.unwrap();

        let mut pdf = photo("doc.pdf");
        pdf.content_type = "application/pdf".into();
        assert!(matches!(
            handoff.register_upload(session.id, pdf).await,
            Err(HandoffError::UnsupportedContentType(_))
        ));

        let mut huge = photo("huge.jpg");
        huge.size_bytes = MAX_UPLOAD_BYTES + 1;
        assert!(matches!(
            handoff.register_upload(session.id, huge).await,
            Err(HandoffError::TooLarge(_))
        ));

        let mut exact = photo("exact.jpg");
        exact.size_bytes = MAX_UPLOAD_BYTES;
        assert!(handoff.register_upload(session.id, exact).await.is_ok());

        let mut nameless = photo("x.jpg");
        nameless.filename = " ".into();
        assert!(matches!(
            handoff.register_upload(session.id, nameless).await,
            Err(HandoffError::InvalidUpload(_))
        ));
    }
}
