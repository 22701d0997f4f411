//! PostgreSQL mobile upload repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use headshot_types::{MobileUpload, UploadSession, UploadSessionId, MAX_UPLOADS_PER_SESSION};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::{MobileUploadRow, UploadInsert, UploadSessionRow};
use crate::repo::MobileUploadRepository;

/// PostgreSQL mobile upload repository
#[derive(Clone)]
pub struct PgMobileUploadRepository {
    pool: PgPool,
}

impl PgMobileUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MobileUploadRepository for PgMobileUploadRepository {
    async fn create_session(&self, session: &UploadSession) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO mobile_upload_sessions (id, created_at, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(session.id.0)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, id: UploadSessionId) -> DbResult<Option<UploadSession>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT id, created_at, expires_at FROM mobile_upload_sessions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UploadSession::from))
    }

    async fn insert_upload(
        &self,
        upload: &MobileUpload,
        now: DateTime<Utc>,
    ) -> DbResult<UploadInsert> {
        // the session row update is the lock; purge and concurrent uploads wait on it
        let inserted = sqlx::query(
            r#"
            WITH slot AS (
                UPDATE mobile_upload_sessions
                SET upload_count = upload_count + 1
                WHERE id = $2 AND expires_at > $8 AND upload_count < $9
                RETURNING id
            )
            INSERT INTO mobile_uploads
                (id, session_id, file_url, filename, original_name, content_type, size_bytes, uploaded_at)
            SELECT $1, slot.id, $3, $4, $5, $6, $7, $8
            FROM slot
            "#,
        )
        .bind(upload.id)
        .bind(upload.session_id.0)
        .bind(&upload.file_url)
        .bind(&upload.filename)
        .bind(&upload.original_name)
        .bind(&upload.content_type)
        .bind(upload.size_bytes)
        .bind(now)
        .bind(MAX_UPLOADS_PER_SESSION)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(UploadInsert::Stored);
        }

        let live: Option<bool> = sqlx::query_scalar(
            "SELECT expires_at > $2 FROM mobile_upload_sessions WHERE id = $1",
        )
        .bind(upload.session_id.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match live {
            Some(true) => UploadInsert::SessionFull,
            _ => UploadInsert::SessionClosed,
        })
    }

    async fn take_uploads(&self, id: UploadSessionId) -> DbResult<Vec<MobileUpload>> {
        let mut rows = sqlx::query_as::<_, MobileUploadRow>(
            r#"
            DELETE FROM mobile_uploads
            WHERE session_id = $1
            RETURNING id, session_id, file_url, filename, original_name, content_type,
                      size_bytes, uploaded_at
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.sort_by_key(|row| row.uploaded_at);
        Ok(rows.into_iter().map(MobileUpload::from).collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        // uploads go with their session (ON DELETE CASCADE)
        let deleted = sqlx::query("DELETE FROM mobile_upload_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
