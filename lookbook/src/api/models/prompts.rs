//! API request/response models for prompt enhancement.

use crate::prompts::{GenerationSettings, PromptSource};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromptEnhanceRequest {
    pub prompt: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub settings: GenerationSettings,
    /// Whether the model input will be a side-by-side composite of two photos
    #[serde(default)]
    pub has_combined_input: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PromptEnhanceResponse {
    pub success: bool,
    pub enhanced_prompt: String,
    /// `model` when the language model answered, `fallback` for a built-in template
    pub source: PromptSource,
}
