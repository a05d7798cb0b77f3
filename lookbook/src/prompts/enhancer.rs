//! Prompt enhancement through a language model, with template fallback.

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;

use super::settings::GenerationSettings;
use super::templates::{build_enhancement_instruction, fallback_prompt};
use crate::clients::{GeminiClient, InlineImage, OpenAiClient};
use crate::config::{EnhancementProvider, PromptEnhancementConfig};
use crate::metrics;

const OPENAI_SYSTEM_PROMPT: &str =
    "You write prompts for an image-editing model used for fashion and jewelry product photos.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    Model,
    Fallback,
}

impl PromptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptSource::Model => "model",
            PromptSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnhancedPrompt {
    pub text: String,
    pub source: PromptSource,
}

pub enum PromptEnhancer {
    Gemini(GeminiClient),
    OpenAi(OpenAiClient),
    /// Always uses the fallback templates
    Disabled,
}

impl PromptEnhancer {
    pub fn from_config(config: &PromptEnhancementConfig) -> anyhow::Result<Self> {
        Ok(match config.provider {
            EnhancementProvider::Gemini => Self::Gemini(GeminiClient::new(&config.gemini, config.timeout)?),
            EnhancementProvider::OpenAi => Self::OpenAi(OpenAiClient::new(&config.openai, config.timeout)?),
            EnhancementProvider::Disabled => Self::Disabled,
        })
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            PromptEnhancer::Gemini(_) => "gemini",
            PromptEnhancer::OpenAi(_) => "openai",
            PromptEnhancer::Disabled => "disabled",
        }
    }

    /// Never fails: any model error degrades to [`fallback_prompt`]
    #[instrument(skip_all, fields(provider = self.provider_name(), images = images.len()))]
    pub async fn enhance(
        &self,
        original: &str,
        settings: &GenerationSettings,
        images: &[InlineImage],
        has_combined_input: bool,
    ) -> EnhancedPrompt {
        let instruction = build_enhancement_instruction(original, settings, has_combined_input);
        let generated = match self {
            PromptEnhancer::Gemini(client) => client.generate_text(&instruction, images).await.map_err(anyhow::Error::from),
            PromptEnhancer::OpenAi(client) => client
                .complete(OPENAI_SYSTEM_PROMPT, &instruction)
                .await
                .map_err(anyhow::Error::from),
            PromptEnhancer::Disabled => Err(anyhow::anyhow!("prompt enhancement is disabled")),
        };

        let enhanced = match generated {
            Ok(text) => EnhancedPrompt {
                text,
                source: PromptSource::Model,
            },
            Err(e) => {
                if !matches!(self, PromptEnhancer::Disabled) {
                    warn!(error = %e, "Prompt enhancement failed, using fallback template");
                }
                EnhancedPrompt {
                    text: fallback_prompt(original, settings, has_combined_input),
                    source: PromptSource::Fallback,
                }
            }
        };
        metrics::record_prompt_enhancement(self.provider_name(), enhanced.source.as_str());
        enhanced
    }
}
