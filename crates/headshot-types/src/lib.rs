//! Headshot Types - Shared domain types
//!
//! This crate contains domain types used across the headshot services:
//! - Account identity, plan and subscription status
//! - Plan tiers and their credit allotments
//! - Credit ledger decisions
//! - Billing redirects and mobile upload hand-off records
//! - Headshot styles

pub mod account;
pub mod billing;
pub mod error;
pub mod ledger;
pub mod plan;
pub mod style;
pub mod upload;

pub use account::*;
pub use billing::*;
pub use error::*;
pub use ledger::*;
pub use plan::*;
pub use style::*;
pub use upload::*;
