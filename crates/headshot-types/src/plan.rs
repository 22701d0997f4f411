//! Paid plan tiers

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Paid plan tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// 50 headshots per month - $9.99/mo
    Basic,
    /// 200 headshots per month - $19.99/mo
    Pro,
    /// Unmetered - $39.99/mo
    Unlimited,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [Self::Basic, Self::Pro, Self::Unlimited];

    /// Credits granted at the start of each billing period.
    ///
    /// Unlimited is not metered; its balance is stored as zero.
    pub const fn monthly_credits(&self) -> i64 {
        match self {
            Self::Basic => 50,
            Self::Pro => 200,
            Self::Unlimited => 0,
        }
    }

    /// Get the monthly price in cents
    pub const fn price_cents(&self) -> u32 {
        match self {
            Self::Basic => 999,
            Self::Pro => 1_999,
            Self::Unlimited => 3_999,
        }
    }

    pub const fn is_metered(&self) -> bool {
        !matches!(self, Self::Unlimited)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "unlimited" => Ok(Self::Unlimited),
            _ => Err(ParseError::new("plan tier", s)),
        }
    }
}
