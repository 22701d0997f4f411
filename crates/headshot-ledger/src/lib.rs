//! Headshot Ledger - Entitlement business logic
//!
//! Account sign-in and the credit ledger that gates every paid action.

pub mod account;
pub mod error;
pub mod ledger;

pub use account::*;
pub use error::*;
pub use ledger::*;
