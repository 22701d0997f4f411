//! Headshot Imaging - Generation and photo hand-off
//!
//! The generative image collaborator behind [`ImageGenerator`], its Gemini
//! implementation, the [`Studio`] that charges a credit before every
//! generation, and the phone-to-desktop upload hand-off.

pub mod gemini;
pub mod generator;
pub mod handoff;
pub mod studio;

pub use gemini::{GeminiConfig, GeminiGenerator};
pub use generator::{GeneratedImage, GenerationError, ImageGenerator, SourceImage};
pub use handoff::{HandoffError, MobileHandoff};
pub use studio::{Headshot, Studio, StudioError};
