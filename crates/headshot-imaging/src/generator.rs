//! Generative image collaborator

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use headshot_types::StyleId;
use thiserror::Error;

/// Photo supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceImage {
    /// Decode a base64 payload, with or without a `data:` URL prefix
    pub fn from_base64(encoded: &str, mime_type: Option<&str>) -> Result<Self, base64::DecodeError> {
        let (prefixed_mime, data) = match encoded.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((mime, data)) => (Some(mime), data),
                None => (None, encoded),
            },
            None => (None, encoded),
        };
        Ok(Self {
            bytes: STANDARD.decode(data.trim())?,
            mime_type: mime_type
                .or(prefixed_mime)
                .unwrap_or("image/png")
                .to_string(),
        })
    }
}

/// Image returned by the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    /// `data:` URL suitable for an `<img>` tag
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Generation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Timeout, rate limit or upstream outage. The user may retry.
    #[error("image generation temporarily unavailable: {0}")]
    Transient(String),

    /// The request cannot succeed as made
    #[error("image generation failed: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Turns a selfie into a headshot in the given style
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        image: &SourceImage,
        style: StyleId,
    ) -> Result<GeneratedImage, GenerationError>;
}

/// Instruction sent with every generation request
pub fn headshot_prompt(style: StyleId) -> String {
    format!(
        "Transform this casual selfie into a professional headshot of the same person.\n\
         \n\
         Keep the face exactly as it is: face shape, bone structure, eyes, nose, mouth, \
         jawline, skin tone, hair colour and apparent age must not change. Only clothing, \
         background and lighting may change.\n\
         \n\
         Style: {style}. Use {direction}. Natural, confident expression and a \
         high-quality head-and-shoulders composition.",
        direction = style.direction(),
    )
}
