//! Balance rules shared by the in-memory store.
//!
//! The PostgreSQL store expresses the same rules as conditional `UPDATE`s in
//! [`crate::pg`]; keep the two in step.

use chrono::{DateTime, Utc};
use headshot_types::{Account, ConsumeOutcome, CreditGrant, GrantOutcome};

/// Decide and apply one credit spend on `account`.
pub fn consume(account: &mut Account, now: DateTime<Utc>) -> ConsumeOutcome {
    if account.has_unlimited_usage() {
        return ConsumeOutcome::granted(account.credits);
    }
    if account.credits > 0 {
        account.credits -= 1;
        account.updated_at = now;
        return ConsumeOutcome::granted(account.credits);
    }
    ConsumeOutcome::denied()
}

/// Reset the balance to the grant if its period is strictly newer.
pub fn grant(account: &mut Account, grant: CreditGrant, now: DateTime<Utc>) -> GrantOutcome {
    let newer = account
        .credit_period_marker
        .map_or(true, |marker| marker < grant.period_marker);
    if !newer {
        return GrantOutcome::AlreadyApplied {
            credits: account.credits,
        };
    }
    account.credits = grant.amount;
    account.credit_period_marker = Some(grant.period_marker);
    account.updated_at = now;
    GrantOutcome::Applied {
        credits: account.credits,
    }
}
