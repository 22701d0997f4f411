//! Credit ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Maximum length of an idempotency key
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Caller-supplied token identifying one logical attempt to spend a credit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate and wrap a key: 1 to 128 characters of `[A-Za-z0-9_-:.]`.
    pub fn parse(key: impl Into<String>) -> Result<Self, InvalidIdempotencyKey> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(InvalidIdempotencyKey::Length(key.len()));
        }
        if let Some(c) = key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')))
        {
            return Err(InvalidIdempotencyKey::Character(c));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = InvalidIdempotencyKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

/// Idempotency key rejected at the edge
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdempotencyKey {
    #[error("idempotency key must be 1-{MAX_IDEMPOTENCY_KEY_LEN} characters, got {0}")]
    Length(usize),

    #[error("idempotency key contains invalid character {0:?}")]
    Character(char),
}

/// Result of one `try_consume_credit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOutcome {
    pub granted: bool,
    pub credits_remaining: i64,
    /// True when the decision was recorded by an earlier call with the same key
    pub replayed: bool,
    /// True when the attempt paid for under the key already finished
    #[serde(default)]
    pub completed: bool,
}

impl ConsumeOutcome {
    pub const fn granted(credits_remaining: i64) -> Self {
        Self {
            granted: true,
            credits_remaining,
            replayed: false,
            completed: false,
        }
    }

    pub const fn denied() -> Self {
        Self {
            granted: false,
            credits_remaining: 0,
            replayed: false,
            completed: false,
        }
    }

    /// The same decision, flagged as served from the idempotency record
    pub const fn as_replay(self) -> Self {
        Self {
            replayed: true,
            ..self
        }
    }
}

/// A credit refill tagged with the billing period it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditGrant {
    pub amount: i64,
    pub period_marker: DateTime<Utc>,
}

/// Result of `grant_credits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GrantOutcome {
    /// Balance was reset to the granted amount
    Applied { credits: i64 },
    /// A grant for this or a newer period was already applied
    AlreadyApplied { credits: i64 },
}

impl GrantOutcome {
    pub const fn credits(&self) -> i64 {
        match self {
            Self::Applied { credits } | Self::AlreadyApplied { credits } => *credits,
        }
    }

    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Read-only view of an account's entitlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub account_id: AccountId,
    pub credits: i64,
    pub unlimited: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_validation() {
        assert!(IdempotencyKey::parse("gen-2024-01-01:abc_1.2").is_ok());
        assert_eq!(
            IdempotencyKey::parse(""),
            Err(InvalidIdempotencyKey::Length(0))
        );
        assert_eq!(
            IdempotencyKey::parse("a".repeat(129)),
            Err(InvalidIdempotencyKey::Length(129))
        );
        assert_eq!(
            IdempotencyKey::parse("has space"),
            Err(InvalidIdempotencyKey::Character(' '))
        );
        assert!(IdempotencyKey::parse("a".repeat(128)).is_ok());
    }

    #[test]
    fn test_idempotency_key_deserialize_validates() {
        let ok: IdempotencyKey = serde_json::from_str("\"k-1\"").unwrap();
        assert_eq!(ok.as_str(), "k-1");
        assert!(serde_json::from_str::<IdempotencyKey>("\"bad/key\"").is_err());
    }

    #[test]
    fn test_replay_keeps_decision() {
        let outcome = ConsumeOutcome::granted(4).as_replay();
        assert!(outcome.granted);
        assert_eq!(outcome.credits_remaining, 4);
        assert!(outcome.replayed);
        assert!(!outcome.completed);
    }
}
