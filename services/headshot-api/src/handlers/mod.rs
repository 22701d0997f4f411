//! REST API handlers

pub mod account;
pub mod billing;
pub mod headshots;
pub mod health;
pub mod mobile_uploads;
pub mod shared;
pub mod webhook;

pub use account::*;
pub use billing::*;
pub use headshots::*;
pub use health::*;
pub use mobile_uploads::*;
pub use webhook::*;
