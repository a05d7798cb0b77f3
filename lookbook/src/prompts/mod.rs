//! Prompt assembly for image generation.
//!
//! [`build_enhancement_instruction`] turns a user's prompt and [`GenerationSettings`] into an
//! instruction for a language model; [`PromptEnhancer`] runs it and falls back to
//! [`fallback_prompt`] whenever the model is disabled or fails.

pub mod enhancer;
pub mod settings;
pub mod templates;

pub use enhancer::{EnhancedPrompt, PromptEnhancer, PromptSource};
pub use settings::{GenerationSettings, ProductType};
pub use templates::{build_enhancement_instruction, fallback_prompt};
