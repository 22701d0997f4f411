//! Ledger errors

use thiserror::Error;

/// Entitlement ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Account has not been created through sign-in
    #[error("account not found")]
    AccountNotFound,

    /// Grant amounts are non-negative
    #[error("invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// Identity from the provider is unusable
    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AccountNotFound => 404,
            Self::InvalidAmount(_) | Self::InvalidIdentity(_) => 400,
            Self::Database(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidIdentity(_) => "INVALID_IDENTITY",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<headshot_db::DbError> for LedgerError {
    fn from(err: headshot_db::DbError) -> Self {
        match err {
            headshot_db::DbError::NotFound => Self::AccountNotFound,
            other => {
                tracing::error!("Database error: {}", other);
                Self::Database(other.to_string())
            }
        }
    }
}
