//! Headshot styles

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Photographic style applied to a generated headshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleId {
    Corporate,
    Creative,
    Casual,
    Executive,
    Medical,
    Tech,
}

impl StyleId {
    pub const ALL: [StyleId; 6] = [
        Self::Corporate,
        Self::Creative,
        Self::Casual,
        Self::Executive,
        Self::Medical,
        Self::Tech,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Corporate => "corporate",
            Self::Creative => "creative",
            Self::Casual => "casual",
            Self::Executive => "executive",
            Self::Medical => "medical",
            Self::Tech => "tech",
        }
    }

    /// Wardrobe and setting direction used in the generation prompt
    pub const fn direction(&self) -> &'static str {
        match self {
            Self::Corporate => {
                "a tailored dark business suit, neutral grey studio backdrop, soft even lighting"
            }
            Self::Creative => {
                "smart casual attire with a modern touch, warm colourful backdrop, natural light"
            }
            Self::Casual => "a clean casual shirt, bright airy backdrop, relaxed friendly expression",
            Self::Executive => {
                "a premium suit, dark office backdrop softly out of focus, confident posture"
            }
            Self::Medical => "a white clinical coat over professional attire, clean light backdrop",
            Self::Tech => "a simple crew-neck or hoodie, minimal modern office backdrop",
        }
    }
}

impl std::fmt::Display for StyleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StyleId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| ParseError::new("style", s))
    }
}
