//! Error types for the Headshot API service.
//!
//! Responses carry a stable code and a generic message. Upstream and
//! database details only go to the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use headshot_billing_core::BillingError;
use headshot_db::DbError;
use headshot_imaging::{GenerationError, HandoffError, StudioError};
use headshot_ledger::LedgerError;
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    /// Set when the caller has to buy a plan to continue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_upgrade: Option<bool>,
    /// Set when the same request may succeed later
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{message}")]
    NotFound {
        code: &'static str,
        message: &'static str,
    },

    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
    },

    #[error("No credits left on this plan")]
    InsufficientCredits,

    #[error("Service temporarily unavailable, please retry")]
    Unavailable(String),

    #[error("The request could not be processed")]
    Unprocessable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn account_not_found() -> Self {
        Self::NotFound {
            code: "ACCOUNT_NOT_FOUND",
            message: "Account not found, sign in first",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound { code, .. } | Self::Conflict { code, .. } => *code,
            Self::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Internal(detail) => tracing::error!(detail = %detail, "Internal API error"),
            Self::Unavailable(detail) => tracing::warn!(detail = %detail, "Upstream unavailable"),
            Self::Unprocessable(detail) => tracing::warn!(detail = %detail, "Upstream rejected request"),
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.to_string(),
                requires_upgrade: matches!(self, Self::InsufficientCredits).then_some(true),
                retryable: matches!(self, Self::Unavailable(_)).then_some(true),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound => Self::account_not_found(),
            LedgerError::InvalidAmount(_) | LedgerError::InvalidIdentity(_) => {
                Self::BadRequest(err.to_string())
            }
            LedgerError::Database(detail) => Self::Internal(detail),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::SignatureInvalid(_) | BillingError::MalformedEvent(_) => {
                Self::bad_request("Invalid webhook payload")
            }
            BillingError::AccountNotFound => Self::account_not_found(),
            BillingError::CustomerNotFound => Self::NotFound {
                code: "CUSTOMER_NOT_FOUND",
                message: "No billing account yet, subscribe to a plan first",
            },
            BillingError::PriceNotConfigured(tier) => {
                Self::BadRequest(format!("Plan tier {tier} is not available"))
            }
            BillingError::ProviderTransient(detail) => Self::Unavailable(detail),
            BillingError::ProviderPermanent(detail) => Self::Unprocessable(detail),
            BillingError::Database(e) => Self::Internal(e.to_string()),
            BillingError::Internal(detail) => Self::Internal(detail),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Transient(detail) => Self::Unavailable(detail),
            GenerationError::Permanent(detail) => Self::Unprocessable(detail),
        }
    }
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        match err {
            StudioError::InvalidImage(reason) => Self::BadRequest(format!("Invalid image: {reason}")),
            StudioError::InsufficientCredits => Self::InsufficientCredits,
            StudioError::AlreadyCompleted => Self::Conflict {
                code: "IDEMPOTENCY_KEY_USED",
                message: err.to_string(),
            },
            StudioError::Ledger(e) => e.into(),
            StudioError::Generation(e) => e.into(),
        }
    }
}

impl From<HandoffError> for ApiError {
    fn from(err: HandoffError) -> Self {
        match err {
            HandoffError::SessionNotFound => Self::NotFound {
                code: "SESSION_NOT_FOUND",
                message: "Upload session not found",
            },
            HandoffError::SessionExpired => Self::NotFound {
                code: "SESSION_EXPIRED",
                message: "Upload session expired, start a new one",
            },
            HandoffError::UnsupportedContentType(_)
            | HandoffError::TooLarge(_)
            | HandoffError::InvalidUpload(_) => Self::BadRequest(err.to_string()),
            HandoffError::TooManyUploads => Self::Conflict {
                code: "UPLOAD_LIMIT_REACHED",
                message: err.to_string(),
            },
            HandoffError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
