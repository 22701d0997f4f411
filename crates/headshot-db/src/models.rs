//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use chrono::{DateTime, Utc};
use headshot_types::{
    Account, AccountId, MobileUpload, UploadSession, UploadSessionId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbError;

/// Column list shared by every account query
pub(crate) const ACCOUNT_COLUMNS: &str = "id, subject_id, email, plan, plan_tier, credits, \
     subscription_status, billing_customer_id, subscription_id, credit_period_marker, \
     created_at, updated_at";

/// Account row from the database
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub subject_id: String,
    pub email: String,
    pub plan: String,
    pub plan_tier: Option<String>,
    pub credits: i64,
    pub subscription_status: String,
    pub billing_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub credit_period_marker: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DbError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId(row.id),
            subject_id: row.subject_id,
            email: row.email,
            plan: row.plan.parse()?,
            plan_tier: row.plan_tier.as_deref().map(str::parse).transpose()?,
            credits: row.credits,
            subscription_status: row.subscription_status.parse()?,
            billing_customer_id: row.billing_customer_id,
            subscription_id: row.subscription_id,
            credit_period_marker: row.credit_period_marker,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Account row plus whether the upsert inserted it
#[derive(Debug, Clone, FromRow)]
pub struct SignInRow {
    #[sqlx(flatten)]
    pub account: AccountRow,
    pub inserted: bool,
}

/// Stored credit decision
#[derive(Debug, Clone, FromRow)]
pub struct ConsumptionRow {
    pub granted: bool,
    pub credits_remaining: i64,
    pub completed: bool,
}

/// Per-subscription ordering cursor
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SubscriptionCursor {
    pub subscription_id: String,
    pub account_id: Uuid,
    pub last_event_at: DateTime<Utc>,
    pub ended: bool,
    /// Newest recorded event left the subscription past due
    pub past_due: bool,
    /// Subscription has been the account's current one
    pub adopted: bool,
}

/// Event queued for manual reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationItem {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub customer_id: Option<String>,
    pub reason: String,
    pub payload: String,
}

/// Result of storing a phone upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadInsert {
    Stored,
    /// Session missing or expired
    SessionClosed,
    /// Session already took `MAX_UPLOADS_PER_SESSION` uploads
    SessionFull,
}

/// Upload session row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<UploadSessionRow> for UploadSession {
    fn from(row: UploadSessionRow) -> Self {
        Self {
            id: UploadSessionId(row.id),
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// Mobile upload row from the database
#[derive(Debug, Clone, FromRow)]
pub struct MobileUploadRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub file_url: String,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<MobileUploadRow> for MobileUpload {
    fn from(row: MobileUploadRow) -> Self {
        Self {
            id: row.id,
            session_id: UploadSessionId(row.session_id),
            file_url: row.file_url,
            filename: row.filename,
            original_name: row.original_name,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            uploaded_at: row.uploaded_at,
        }
    }
}
